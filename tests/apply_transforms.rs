//! Package-level behavior across layers: placement, shadowing, modes and
//! idempotence of insert-only batches.

use declpatch::{
    parse_snippet, AddConst, AddFunction, AddType, AddVar, DedupImports, DirLayer, MemLayer,
    Outcome, Package, PackageError, ReadOnly, Transform,
};
use proptest::prelude::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn mem_package(input: MemLayer, output: &Arc<MemLayer>, sub_dir: &str) -> Package {
    Package::new(
        Arc::new(ReadOnly(input)),
        output.clone(),
        "example.com/app",
        sub_dir,
    )
    .unwrap()
}

#[test]
fn generator_workflow_without_formatter() {
    let input = MemLayer::new().with_file(
        "internal/store/store.go",
        "package store\n\nimport (\n\t\"io\"\n)\n\ntype Store struct{}\n",
    );
    let output = Arc::new(MemLayer::new());
    let mut package = mem_package(input, &output, "internal/store");

    let mut transforms = parse_snippet(
        "store.go",
        "import \"io\"\nimport \"os\"\n\nfunc (s *Store) Close() error { return nil }\n",
    )
    .unwrap();
    transforms.push(Transform::DedupImports(DedupImports::default()));

    let report = package.apply_transforms(transforms).unwrap();
    assert_eq!(report.transforms.len(), 4);
    assert_eq!(
        report.transforms[3].outcome,
        Outcome::Rewritten {
            files: vec!["store.go".into()]
        }
    );
    assert_eq!(
        output.get_string("internal/store/store.go").as_deref(),
        Some(
            "package store\n\nimport (\n\t\"io\"\n\t\n\t\"os\"\n)\n\ntype Store struct{}\nfunc (s *Store) Close() error { return nil }\n"
        )
    );
    assert_eq!(output.files().unwrap().len(), 1);
}

#[test]
fn new_file_gets_package_header() {
    let input = MemLayer::new().with_file("pkg/a.go", "package widgets\n");
    let output = Arc::new(MemLayer::new());
    let mut package = mem_package(input, &output, "pkg");

    package
        .apply_transforms([Transform::Type(AddType {
            filename: "widget.go".into(),
            name: "Widget".into(),
            text: "// Widget is a widget.\ntype Widget struct{}".into(),
            replace: false,
        })])
        .unwrap();

    assert_eq!(package.local_name(), "widgets");
    assert_eq!(
        output.get_string("pkg/widget.go").as_deref(),
        Some("package widgets\n\n// Widget is a widget.\ntype Widget struct{}\n")
    );
}

#[test]
fn replace_of_partial_group_is_rejected_and_names_transform() {
    let input = MemLayer::new().with_file(
        "consts.go",
        "package app\n\nconst (\n\tA = 1\n\tB = 2\n)\n",
    );
    let output = Arc::new(MemLayer::new());
    let mut package = mem_package(input, &output, "");

    let err = package
        .apply_transforms([
            Transform::Const(AddConst {
                filename: "consts.go".into(),
                names: vec!["C".into()],
                text: "const C = 3".into(),
                replace: false,
            }),
            Transform::Const(AddConst {
                filename: "consts.go".into(),
                names: vec!["A".into()],
                text: "const A = 10".into(),
                replace: true,
            }),
        ])
        .unwrap_err();

    assert!(matches!(
        err,
        PackageError::Transform { index: 1, kind: "const", .. }
    ));
    assert!(err.to_string().contains("consts.go"));
    // the first transform was already written through
    assert_eq!(
        output.get_string("consts.go").as_deref(),
        Some("package app\n\nconst (\n\tA = 1\n\tB = 2\n)\nconst C = 3\n")
    );
}

#[test]
fn replacing_whole_group_with_superset() {
    let input = MemLayer::new().with_file(
        "vars.go",
        "package app\n\n// defaults\nvar (\n\tx = 1\n\ty = 2\n)\n\nfunc F() {}\n",
    );
    let output = Arc::new(MemLayer::new());
    let mut package = mem_package(input, &output, "");

    let transforms =
        parse_snippet("vars.go", "var (\n\tx = 1\n\ty = 2\n\tz = 3\n)\n").unwrap();
    let transforms = transforms.into_iter().map(|mut t| {
        t.set_replace(true);
        t
    });
    let report = package.apply_transforms(transforms).unwrap();

    assert_eq!(
        report.transforms[0].outcome,
        Outcome::Replaced {
            from: "vars.go".into(),
            file: "vars.go".into()
        }
    );
    assert_eq!(
        output.get_string("vars.go").as_deref(),
        Some("package app\n\n\n\nfunc F() {}\nvar (\n\tx = 1\n\ty = 2\n\tz = 3\n)\n")
    );
}

#[test]
fn directory_layers_keep_modes_and_leave_input_alone() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    fs::create_dir_all(input_dir.path().join("svc")).unwrap();
    let original = "package svc\n\nfunc A() error { return nil }\n";
    fs::write(input_dir.path().join("svc/a.go"), original).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(
            input_dir.path().join("svc/a.go"),
            fs::Permissions::from_mode(0o600),
        )
        .unwrap();
    }

    let mut package = Package::new(
        Arc::new(ReadOnly(DirLayer::open(input_dir.path()).unwrap())),
        Arc::new(DirLayer::open(output_dir.path()).unwrap()),
        "example.com/app",
        "svc",
    )
    .unwrap();

    let transforms = parse_snippet("b.go", "func A() (err error) { return }\n")
        .unwrap()
        .into_iter()
        .map(|mut t| {
            t.set_replace(true);
            t
        });
    let report = package.apply_transforms(transforms).unwrap();
    assert_eq!(
        report.written.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["a.go", "b.go"]
    );

    assert_eq!(
        fs::read_to_string(input_dir.path().join("svc/a.go")).unwrap(),
        original
    );
    assert_eq!(
        fs::read_to_string(output_dir.path().join("svc/a.go")).unwrap(),
        "package svc\n\n\n"
    );
    assert_eq!(
        fs::read_to_string(output_dir.path().join("svc/b.go")).unwrap(),
        "package svc\n\nfunc A() (err error) { return }\n"
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = |p: &str| {
            fs::metadata(output_dir.path().join(p))
                .unwrap()
                .permissions()
                .mode()
                & 0o777
        };
        assert_eq!(mode("svc/a.go"), 0o600);
        assert_eq!(mode("svc/b.go"), 0o644);
    }
}

#[test]
fn syntax_errors_in_members_stop_the_load() {
    let input = MemLayer::new().with_file("broken.go", "package app\n\nfunc F( {\n");
    let output = Arc::new(MemLayer::new());
    let mut package = mem_package(input, &output, "");

    let err = package.find_type("T").unwrap_err();
    assert!(matches!(err, PackageError::Syntax(_)));
    assert!(err.to_string().contains("broken.go"));
}

#[test]
fn targets_outside_the_package_are_rejected_before_writing() {
    let kept = "package sub\n\nfunc Keep() {}\n";
    let output = Arc::new(
        MemLayer::new()
            .with_file("sub/a.go", kept)
            .with_file("notes.txt", "notes\n"),
    );
    let mut package = mem_package(MemLayer::new(), &output, "");

    for filename in ["sub/a.go", "notes.txt", "./a.go"] {
        let err = package
            .apply_transforms([Transform::Function(AddFunction {
                filename: filename.into(),
                name: "F".into(),
                receiver: String::new(),
                text: "func F() {}".into(),
                replace: false,
            })])
            .unwrap_err();
        assert!(
            matches!(err.root(), PackageError::InvalidFileName { name } if name == filename),
            "{filename}: {err}"
        );
    }

    assert_eq!(output.get_string("sub/a.go").as_deref(), Some(kept));
    assert_eq!(output.get_string("notes.txt").as_deref(), Some("notes\n"));
    assert_eq!(output.files().unwrap().len(), 2);
}

fn var_and_type_batch() -> Vec<Transform> {
    vec![
        Transform::Var(AddVar {
            filename: "a.go".into(),
            names: vec!["x".into()],
            text: "var x = 1".into(),
            replace: false,
        }),
        Transform::Type(AddType {
            filename: "a.go".into(),
            name: "Widget".into(),
            text: "type Widget struct{}".into(),
            replace: false,
        }),
    ]
}

#[test]
fn var_and_type_inserts_are_idempotent_across_batches() {
    let input = MemLayer::new().with_file("a.go", "package app\n\nfunc F() {}\n");
    let output = Arc::new(MemLayer::new());
    let mut package = mem_package(input, &output, "");

    let first = package.apply_transforms(var_and_type_batch()).unwrap();
    assert_eq!(first.changed(), 2);
    let expected = "package app\n\nfunc F() {}\nvar x = 1\ntype Widget struct{}\n";
    assert_eq!(output.get_string("a.go").as_deref(), Some(expected));

    let second = package.apply_transforms(var_and_type_batch()).unwrap();
    assert_eq!(second.changed(), 0);
    assert!(second
        .transforms
        .iter()
        .all(|t| t.outcome == Outcome::Unchanged));
    assert_eq!(output.get_string("a.go").as_deref(), Some(expected));
}

#[test]
fn replacing_a_type_drops_its_doc_comment() {
    let input = MemLayer::new().with_file(
        "a.go",
        "package app\n\n// Widget is old.\ntype Widget struct{}\n\nfunc F() {}\n",
    );
    let output = Arc::new(MemLayer::new());
    let mut package = mem_package(input, &output, "");

    let replace = Transform::Type(AddType {
        filename: "a.go".into(),
        name: "Widget".into(),
        text: "// Widget has an id.\ntype Widget struct{ id int }".into(),
        replace: true,
    });
    let report = package.apply_transforms([replace]).unwrap();

    assert_eq!(
        report.transforms[0].outcome,
        Outcome::Replaced {
            from: "a.go".into(),
            file: "a.go".into()
        }
    );
    assert_eq!(
        output.get_string("a.go").as_deref(),
        Some("package app\n\n\n\nfunc F() {}\n// Widget has an id.\ntype Widget struct{ id int }\n")
    );
}

#[test]
fn replacing_one_name_of_a_type_group_is_ambiguous() {
    let source = "package app\n\ntype (\n\tA int\n\tB string\n)\n";
    let input = MemLayer::new().with_file("types.go", source);
    let output = Arc::new(MemLayer::new());
    let mut package = mem_package(input, &output, "");

    let add = |replace| {
        Transform::Type(AddType {
            filename: "types.go".into(),
            name: "A".into(),
            text: "type A uint".into(),
            replace,
        })
    };

    let report = package.apply_transforms([add(false)]).unwrap();
    assert_eq!(report.transforms[0].outcome, Outcome::Unchanged);

    let err = package.apply_transforms([add(true)]).unwrap_err();
    match err.root() {
        PackageError::AmbiguousGroup { requested, existing } => {
            assert_eq!(requested, &vec!["A".to_string()]);
            assert_eq!(existing, &vec!["A".to_string(), "B".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(output.files().unwrap().is_empty());
}

const NAMES: [&str; 4] = ["Alpha", "Beta", "Gamma", "Delta"];

proptest! {
    #[test]
    fn insert_only_batches_are_idempotent(
        existing in proptest::sample::subsequence(NAMES.to_vec(), 0..=4),
        wanted in proptest::sample::subsequence(NAMES.to_vec(), 1..=4),
    ) {
        let mut base = String::from("package p\n\n");
        for name in &existing {
            base.push_str(&format!("func {name}() {{}}\n\n"));
        }
        let input = MemLayer::new().with_file("a.go", base);
        let output = Arc::new(MemLayer::new());
        let mut package = Package::new(
            Arc::new(ReadOnly(input)),
            output.clone(),
            "example.com/p",
            "",
        )
        .unwrap();

        let snippet: String = wanted
            .iter()
            .map(|name| format!("func {name}() {{ println(\"new\") }}\n\n"))
            .collect();
        let transforms = parse_snippet("b.go", &snippet).unwrap();

        let first = package.apply_transforms(transforms.clone()).unwrap();
        let expected_changes = wanted.iter().filter(|n| !existing.contains(n)).count();
        prop_assert_eq!(first.changed(), expected_changes);
        let after_first = output.files().unwrap();

        let second = package.apply_transforms(transforms).unwrap();
        prop_assert_eq!(second.changed(), 0);
        prop_assert_eq!(output.files().unwrap(), after_first);

        let all: String = package
            .file_names()
            .filter_map(|name| package.file(name))
            .map(|file| String::from_utf8_lossy(file.bytes()).into_owned())
            .collect();
        for name in wanted.iter().chain(existing.iter()) {
            let needle = format!("func {name}()");
            prop_assert_eq!(all.matches(needle.as_str()).count(), 1);
        }
    }
}

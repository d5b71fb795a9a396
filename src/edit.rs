use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The splice primitive: byte-span replacement with verification.
///
/// Declaration removal, import insertion and the dedup rewrite all compile
/// down to this. Spans come from the parsed declaration list; applying an
/// edit only checks that the bytes it is about to overwrite are the bytes
/// the span was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until applied"]
pub struct Edit {
    /// Member file name, for diagnostics
    pub file: String,
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// Bytes written over [byte_start, byte_end)
    pub new_text: Vec<u8>,
    /// What we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact bytes required
    ExactMatch(Vec<u8>),
    /// xxh3 hash of expected bytes (for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided bytes match the verification criteria.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => bytes == expected.as_slice(),
            EditVerification::Hash(expected_hash) => xxh3_64(bytes) == *expected_hash,
        }
    }

    /// Create verification from bytes, using a hash over 1KB.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.len() > 1024 {
            EditVerification::Hash(xxh3_64(bytes))
        } else {
            EditVerification::ExactMatch(bytes.to_vec())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("before-text verification failed at {file}:{byte_start}")]
    BeforeTextMismatch {
        file: String,
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("invalid byte range [{byte_start}, {byte_end}) in {file} of length {file_len}")]
    InvalidByteRange {
        file: String,
        byte_start: usize,
        byte_end: usize,
        file_len: usize,
    },

    #[error("overlapping edits in {file} at byte {byte_start}")]
    Overlap { file: String, byte_start: usize },

    #[error("edit of {file} would create malformed UTF-8")]
    InvalidUtf8Edit { file: String },
}

impl Edit {
    /// Replace `[byte_start, byte_end)`, verifying it currently holds `expected_before`.
    pub fn new(
        file: impl Into<String>,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<Vec<u8>>,
        expected_before: &[u8],
    ) -> Self {
        Self {
            file: file.into(),
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_bytes(expected_before),
        }
    }

    /// Remove a span of `content`, capturing its current bytes as the expectation.
    pub fn delete(file: impl Into<String>, content: &[u8], range: std::ops::Range<usize>) -> Self {
        let expected = content.get(range.clone()).unwrap_or_default();
        Self::new(file, range.start, range.end, Vec::new(), expected)
    }

    /// Insert bytes at an offset.
    pub fn insert(file: impl Into<String>, at: usize, text: impl Into<Vec<u8>>) -> Self {
        Self::new(file, at, at, text, b"")
    }

    fn validate(&self, content: &[u8]) -> Result<(), EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                file: self.file.clone(),
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                file_len: content.len(),
            });
        }

        let current = &content[self.byte_start..self.byte_end];
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                file: self.file.clone(),
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: String::from_utf8_lossy(current).into_owned(),
            });
        }

        Ok(())
    }

    /// Apply this edit to `content`, returning the new bytes.
    pub fn apply_to(&self, content: &[u8]) -> Result<Vec<u8>, EditError> {
        Self::apply_all(content, vec![self.clone()])
    }

    /// Apply several non-overlapping edits to the same content.
    ///
    /// Edits are sorted by byte_start descending and applied bottom-to-top
    /// to avoid offset invalidation. Insertions at the same offset keep
    /// their given order.
    pub fn apply_all(content: &[u8], edits: Vec<Edit>) -> Result<Vec<u8>, EditError> {
        for edit in &edits {
            edit.validate(content)?;
        }

        let mut edits: Vec<(usize, Edit)> = edits.into_iter().enumerate().collect();
        edits.sort_by(|(ia, a), (ib, b)| {
            (b.byte_start, b.byte_end, ib).cmp(&(a.byte_start, a.byte_end, ia))
        });
        let edits: Vec<Edit> = edits.into_iter().map(|(_, edit)| edit).collect();

        // sorted descending: the earlier edit must end before the later starts
        for window in edits.windows(2) {
            let (later, earlier) = (&window[0], &window[1]);
            if earlier.byte_end > later.byte_start {
                return Err(EditError::Overlap {
                    file: later.file.clone(),
                    byte_start: later.byte_start,
                });
            }
        }

        let mut new_content = content.to_vec();
        for edit in &edits {
            new_content.splice(
                edit.byte_start..edit.byte_end,
                edit.new_text.iter().copied(),
            );
        }

        if std::str::from_utf8(content).is_ok() && std::str::from_utf8(&new_content).is_err() {
            let file = edits.first().map(|e| e.file.clone()).unwrap_or_default();
            return Err(EditError::InvalidUtf8Edit { file });
        }

        Ok(new_content)
    }
}

pub mod loader;
pub mod schema;

pub use loader::{load_from_path, load_from_str, load_plan, ConfigError};
pub use schema::{
    ExpandError, FormatterSection, Metadata, PatchConfig, Step, ValidationError, ValidationIssue,
};

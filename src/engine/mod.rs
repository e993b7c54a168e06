//! Engine module: command line front end and shared path helpers

pub mod arg_parser;
pub mod cli;
pub mod progress;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::Cli;
pub use cli::{build_settings, handle_run};
pub use progress::{ReporterOpts, RunSummary, report_progress};
pub use tools::{
    check_source_and_canonicalize, ensure_dir, file_name_lossy, lowercase_extension,
    normalized_name,
};

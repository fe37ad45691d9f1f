pub mod source;
pub mod types;

pub use source::{json_lines, run_source};
pub use types::*;

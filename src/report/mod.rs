pub mod json;

pub use json::{build_report, write_report};

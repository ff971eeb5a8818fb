pub mod logging;
pub mod text;

pub use text::{normalize_whitespace, truncate_text};

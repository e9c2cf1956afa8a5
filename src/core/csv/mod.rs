pub mod detector;
pub mod models;
pub mod parser;
pub mod sanitizer;
pub mod tokenizer;

pub use models::{ParseConfig, ParseError, ParsedTable};
pub use parser::parse_csv;
pub use sanitizer::sanitize;

pub mod dates;
pub mod keywords;
pub mod parser;
pub mod types;

pub use keywords::KeywordTables;
pub use parser::{TaskParser, parse};
pub use types::{Category, Level, ParsedTask, RecurrenceKind, RecurringPattern};

pub mod mcq;
pub mod output_row;
pub mod paper;
pub mod subject;
pub mod window;

pub use mcq::{AnswerLetter, Difficulty, Mcq, OPTION_COUNT};
pub use output_row::{OutputRow, OUTPUT_COLUMNS};
pub use paper::{normalize_pmcid, FigureRecord, PaperMetadata, ABSTRACT_NOT_AVAILABLE};
pub use subject::UsmleSubject;
pub use window::{parse_date, DateWindow, QueryWindow, Selection};

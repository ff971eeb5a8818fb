pub mod eutils_client;

pub use eutils_client::{DocSummary, EutilsClient, SearchPage};

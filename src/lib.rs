pub mod actions;
pub mod config;
pub mod debounce;
pub mod error;
pub mod history;
pub mod models;
pub mod record_store;
pub mod search_index;

pub use error::{HistoryError, HistoryResult};
pub use history::{Action, ActionKind, ActionTable, CommandHistory, HistoryEvent};
pub use models::{FilterCriteria, Record, RecordStatus};
pub use search_index::SearchIndex;

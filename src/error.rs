use thiserror::Error;

use crate::history::ActionKind;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("no handler registered for action `{}`", .0.as_str())]
    UnregisteredAction(ActionKind),

    #[error("action `{}` failed: {cause:#}", .kind.as_str())]
    Action { kind: ActionKind, cause: anyhow::Error },

    #[error("history import rejected: {0}")]
    Import(#[from] serde_json::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

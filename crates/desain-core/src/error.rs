use thiserror::Error;

use crate::record::Status;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DesainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: Status, to: Status },
}

//! Error types for the DEX merge engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MergeError>;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("index overflow: {kind} index {value} exceeds 0x{limit:x}")]
    IndexOverflow {
        kind: &'static str,
        value: u32,
        limit: u32,
    },

    #[error("class collision: {0} is defined in both inputs")]
    Collision(String),

    #[error("alignment violation: cursor at offset {offset} is not {align}-byte aligned")]
    Alignment { offset: usize, align: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

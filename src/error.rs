use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatasetError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl DatasetError {
    pub(crate) fn check_index(what: &'static str, index: usize, len: usize) -> DatasetResult<()> {
        if index < len {
            Ok(())
        } else {
            Err(Self::IndexOutOfRange { what, index, len })
        }
    }
}

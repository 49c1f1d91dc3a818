use std::path::PathBuf;

use cascade_core::error::StreamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("{op} {}: {source}", path.display())]
    File {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sorted run {0} not found")]
    MissingRun(usize),
}

impl IoError {
    pub(crate) fn file(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| IoError::File { op, path, source }
    }
}

impl From<IoError> for StreamError {
    fn from(e: IoError) -> Self {
        StreamError::Storage(e.to_string())
    }
}

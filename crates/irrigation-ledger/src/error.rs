use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Chain(#[from] crate::audit::ChainViolation),
    #[error("{path}:{line}: unreadable record: {detail}")]
    Corrupt {
        path: Utf8PathBuf,
        line: usize,
        detail: String,
    },
}

impl LedgerError {
    pub(crate) fn io(path: &camino::Utf8Path, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

use thiserror::Error;

/// Failures raised by the import pipeline.
///
/// `Configuration` and `Fetch` during setup stop the whole batch. Everything
/// else is scoped to a single external run: it is turned into an error string
/// on the batch result and the loop moves on.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("translation failed: {0}")]
    Translation(String),
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("store rejected record: {0}")]
    Persistence(String),
}

impl ImportError {
    /// True for the setup-phase variants that abort a batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImportError::Configuration(_) | ImportError::Fetch(_))
    }

    pub(crate) fn fetch(context: &str, err: anyhow::Error) -> Self {
        ImportError::Fetch(format!("{context}: {err:#}"))
    }
}

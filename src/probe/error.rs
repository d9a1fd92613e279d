use thiserror::Error;

/// Failure of a single platform probe.
///
/// The fingerprint engine never surfaces these to callers of `add_*`; they
/// are folded into an absent component value and kept as diagnostics.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0} is not available on this platform")]
    Unsupported(&'static str),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{program}` exited with {status}")]
    Command { program: String, status: String },

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("token store error: {0}")]
    Store(String),
}

impl ProbeError {
    pub fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;

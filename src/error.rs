use thiserror::Error;

/// Errors raised inside the shell integration layer.
///
/// None of these reach the user. The UI-facing entry points log them and fall
/// back to a default icon or to not showing a menu at all.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("no icon could be resolved for {path}")]
    UnresolvedIcon { path: String },

    #[error("shell binding failed during {operation}: {reason}")]
    Binding {
        operation: &'static str,
        reason: String,
    },

    #[error("malformed item identifier: {0}")]
    MalformedItemId(String),

    #[error("invalid class identifier {value:?}")]
    InvalidClsid {
        value: String,
        #[source]
        source: uuid::Error,
    },

    #[error("could not start icon workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("config I/O error: {0}")]
    Config(#[from] std::io::Error),

    #[error("config format error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(windows)]
    #[error("win32 error: {0}")]
    Win32(#[from] windows::core::Error),
}

impl ShellError {
    pub fn binding(operation: &'static str, reason: impl ToString) -> Self {
        ShellError::Binding {
            operation,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;

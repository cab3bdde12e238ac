//! Errors - エラー型と分類

use thiserror::Error;

/// ErrorKind は実行エラーの運用分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: 内部インフラの障害（ワーカー停止など）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// RelayError はドメインエラー
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("platform rejected request ({status}): {body}")]
    Platform { status: u16, body: String },

    #[error("platform error {code}: {message}")]
    PlatformCode { code: i64, message: String },

    #[error("agent: {0}")]
    Agent(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("config: {0}")]
    Config(String),

    #[error("dispatch: {0}")]
    Dispatch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent(message.into())
    }

    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch(message.into())
    }

    /// Classify for retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Http(e) if e.is_timeout() || e.is_connect() => ErrorKind::Transient,
            RelayError::Http(_) => ErrorKind::Permanent,
            RelayError::Platform { status, .. } if *status == 429 || *status >= 500 => {
                ErrorKind::Transient
            }
            RelayError::Platform { .. } | RelayError::PlatformCode { .. } => ErrorKind::Permanent,
            RelayError::Agent(_) => ErrorKind::Transient,
            RelayError::InvalidEvent(_) | RelayError::Config(_) => ErrorKind::Permanent,
            RelayError::Dispatch(_) | RelayError::Io(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

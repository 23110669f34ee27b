//! Errors - レジストリ操作のエラー型と分類
//!
//! RegistryError は collaborator（ACR / in-memory）から返るエラーです。
//! sweep 側は kind() を見て「run を止めるか」を判断します。

use thiserror::Error;

/// ErrorKind は運用上の分類
///
/// - Transient: 一時的なエラー（次回の起動で回復しうる）
/// - Permanent: 恒久的なエラー（対象が存在しない、リクエストが不正）
/// - Authentication: 認証・認可エラー（run 全体が失敗）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Authentication,
}

/// RegistryError は collaborator が返すエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry rejected credentials: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("registry returned status {status}: {message}")]
    Service { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid registry response: {0}")]
    Decode(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Unauthorized(_) => ErrorKind::Authentication,
            RegistryError::NotFound(_) | RegistryError::Decode(_) => ErrorKind::Permanent,
            RegistryError::Service { status, .. } if *status >= 500 || *status == 429 => {
                ErrorKind::Transient
            }
            RegistryError::Service { .. } => ErrorKind::Permanent,
            RegistryError::Transport(_) => ErrorKind::Transient,
        }
    }

    /// Maps a non-success HTTP status to the matching variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => RegistryError::Unauthorized(message),
            404 => RegistryError::NotFound(message),
            _ => RegistryError::Service { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(401, ErrorKind::Authentication)]
    #[case(403, ErrorKind::Authentication)]
    #[case(404, ErrorKind::Permanent)]
    #[case(400, ErrorKind::Permanent)]
    #[case(429, ErrorKind::Transient)]
    #[case(503, ErrorKind::Transient)]
    fn status_maps_to_kind(#[case] status: u16, #[case] kind: ErrorKind) {
        assert_eq!(RegistryError::from_status(status, "x").kind(), kind);
    }

    #[test]
    fn display_includes_status() {
        let err = RegistryError::from_status(500, "boom");
        assert_eq!(err.to_string(), "registry returned status 500: boom");
    }
}

//! TokenCredential port - レジストリ用 bearer token の取得
//!
//! token の取得方法（client secret / managed identity など）は実装に閉じ込め、
//! AcrRegistryClient は scope を渡して token を受け取るだけにします。

use async_trait::async_trait;

use crate::domain::RegistryError;

/// TokenCredential は scope ごとの access token を返す
///
/// scope の例: `registry:catalog:*`, `repository:web:metadata_read,delete`
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn access_token(&self, scope: &str) -> Result<String, RegistryError>;
}

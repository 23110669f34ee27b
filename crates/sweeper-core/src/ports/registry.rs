//! RegistryClient port - コンテナレジストリへの狭いインターフェース
//!
//! sweep が必要とする操作は 4 つだけです：
//! - repository 名の列挙
//! - manifest の列挙（last-updated 降順）
//! - tag の削除
//! - manifest の削除
//!
//! # 実装
//! - **InMemoryRegistry**: テスト・デモ用
//! - **AcrRegistryClient**: Azure Container Registry 互換の REST API

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::{ArtifactManifest, Digest, RegistryError};

/// 列挙結果は遅延ストリーム（有限・再開不可・ネットワーク由来）
pub type RegistryStream<'a, T> = BoxStream<'a, Result<T, RegistryError>>;

/// RegistryClient はレジストリ操作を抽象化
///
/// # 設計原則
/// - 列挙はページングを隠蔽した stream として返す
/// - retry / backoff は実装側の責務（sweep は関知しない）
/// - `Send + Sync` を要求（HTTP trigger から共有されるため）
#[async_trait]
pub trait RegistryClient: Send + Sync {
    fn list_repository_names(&self) -> RegistryStream<'_, String>;

    /// `repository` の manifest を `last_updated_on` の新しい順に返す
    fn list_manifests<'a>(&'a self, repository: &'a str) -> RegistryStream<'a, ArtifactManifest>;

    async fn delete_tag(
        &self,
        repository: &str,
        digest: &Digest,
        tag: &str,
    ) -> Result<(), RegistryError>;

    async fn delete_manifest(&self, repository: &str, digest: &Digest)
    -> Result<(), RegistryError>;
}

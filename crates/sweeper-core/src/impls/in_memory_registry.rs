//! InMemoryRegistry - テスト・デモ用のレジストリ
//!
//! # 学習ポイント
//! - std::sync::Mutex による内部可変性（ロックを跨いで await しない）
//! - 呼び出し履歴の記録（削除順序をテストで検証するため）
//! - 失敗注入（tag / manifest / 列挙）

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use crate::domain::{ArtifactManifest, Digest, RegistryError};
use crate::ports::{RegistryClient, RegistryStream};

/// InMemoryRegistry に対して行われた呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    ListRepositories,
    ListManifests {
        repository: String,
    },
    DeleteTag {
        repository: String,
        digest: Digest,
        tag: String,
    },
    DeleteManifest {
        repository: String,
        digest: Digest,
    },
}

/// 列挙の途中で失敗させる設定
#[derive(Debug, Clone)]
struct ListingFailure {
    repository: Option<String>,
    after: usize,
    error: RegistryError,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// 登録順を保持する（repository の列挙順になる）
    repositories: Vec<(String, Vec<ArtifactManifest>)>,
    calls: Vec<RegistryCall>,
    failing_tags: HashSet<(Digest, String)>,
    failing_manifests: HashSet<Digest>,
    listing_failures: Vec<ListingFailure>,
}

/// InMemoryRegistry はプロセス内のレジストリ
///
/// # 使用例
/// ```ignore
/// let registry = InMemoryRegistry::new()
///     .with_repository("web", vec![manifest_a, manifest_b]);
/// let result = job.run(&policy, &registry).await?;
/// assert_eq!(registry.calls().len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<RegistryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// repository を追加（manifest の repository_name は `name` に揃える）
    pub fn with_repository(self, name: &str, manifests: Vec<ArtifactManifest>) -> Self {
        {
            let mut state = self.lock();
            let manifests = manifests
                .into_iter()
                .map(|mut m| {
                    m.repository_name = name.to_string();
                    m
                })
                .collect();
            state.repositories.push((name.to_string(), manifests));
        }
        self
    }

    /// 指定した digest の tag 削除を失敗させる
    pub fn fail_tag_deletion(self, digest: impl Into<Digest>, tag: &str) -> Self {
        self.lock()
            .failing_tags
            .insert((digest.into(), tag.to_string()));
        self
    }

    /// 指定した digest の manifest 削除を失敗させる
    pub fn fail_manifest_deletion(self, digest: impl Into<Digest>) -> Self {
        self.lock().failing_manifests.insert(digest.into());
        self
    }

    /// repository 名の列挙を `after` 件返した後に失敗させる
    pub fn fail_repository_listing_after(self, after: usize, error: RegistryError) -> Self {
        self.lock().listing_failures.push(ListingFailure {
            repository: None,
            after,
            error,
        });
        self
    }

    /// `repository` の manifest 列挙を `after` 件返した後に失敗させる
    pub fn fail_manifest_listing_after(
        self,
        repository: &str,
        after: usize,
        error: RegistryError,
    ) -> Self {
        self.lock().listing_failures.push(ListingFailure {
            repository: Some(repository.to_string()),
            after,
            error,
        });
        self
    }

    /// これまでの呼び出し履歴
    pub fn calls(&self) -> Vec<RegistryCall> {
        self.lock().calls.clone()
    }

    /// 削除系の呼び出しだけを返す
    pub fn delete_calls(&self) -> Vec<RegistryCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    RegistryCall::DeleteTag { .. } | RegistryCall::DeleteManifest { .. }
                )
            })
            .cloned()
            .collect()
    }

    /// `repository` に残っている digest（登録順）
    pub fn remaining_digests(&self, repository: &str) -> Vec<Digest> {
        self.lock()
            .repositories
            .iter()
            .find(|(name, _)| name == repository)
            .map(|(_, manifests)| manifests.iter().map(|m| m.digest.clone()).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listing_failure(&self, repository: Option<&str>) -> Option<ListingFailure> {
        self.lock()
            .listing_failures
            .iter()
            .find(|f| f.repository.as_deref() == repository)
            .cloned()
    }
}

/// `items` を流し、`failure` があれば `after` 件目の後にエラーを 1 つ流す
fn stream_with_failure<'a, T: Send + 'a>(
    items: Vec<T>,
    failure: Option<ListingFailure>,
) -> RegistryStream<'a, T> {
    match failure {
        Some(failure) => {
            let head = items.into_iter().take(failure.after).map(Ok);
            stream::iter(head.chain(std::iter::once(Err(failure.error)))).boxed()
        }
        None => stream::iter(items.into_iter().map(Ok)).boxed(),
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    fn list_repository_names(&self) -> RegistryStream<'_, String> {
        let names: Vec<String> = {
            let mut state = self.lock();
            state.calls.push(RegistryCall::ListRepositories);
            state.repositories.iter().map(|(n, _)| n.clone()).collect()
        };
        stream_with_failure(names, self.listing_failure(None))
    }

    fn list_manifests<'a>(&'a self, repository: &'a str) -> RegistryStream<'a, ArtifactManifest> {
        let mut manifests: Vec<ArtifactManifest> = {
            let mut state = self.lock();
            state.calls.push(RegistryCall::ListManifests {
                repository: repository.to_string(),
            });
            state
                .repositories
                .iter()
                .find(|(name, _)| name == repository)
                .map(|(_, manifests)| manifests.clone())
                .unwrap_or_default()
        };
        manifests.sort_by(|a, b| b.last_updated_on.cmp(&a.last_updated_on));
        stream_with_failure(manifests, self.listing_failure(Some(repository)))
    }

    async fn delete_tag(
        &self,
        repository: &str,
        digest: &Digest,
        tag: &str,
    ) -> Result<(), RegistryError> {
        let mut state = self.lock();
        state.calls.push(RegistryCall::DeleteTag {
            repository: repository.to_string(),
            digest: digest.clone(),
            tag: tag.to_string(),
        });
        if state
            .failing_tags
            .contains(&(digest.clone(), tag.to_string()))
        {
            return Err(RegistryError::Service {
                status: 500,
                message: format!("injected failure deleting {repository}:{tag}"),
            });
        }

        let manifest = state
            .repositories
            .iter_mut()
            .filter(|(name, _)| name == repository)
            .flat_map(|(_, manifests)| manifests.iter_mut())
            .find(|m| &m.digest == digest)
            .ok_or_else(|| RegistryError::NotFound(format!("{repository}@{digest}")))?;
        let before = manifest.tags.len();
        manifest.tags.retain(|t| t != tag);
        if manifest.tags.len() == before {
            return Err(RegistryError::NotFound(format!("{repository}:{tag}")));
        }
        Ok(())
    }

    async fn delete_manifest(
        &self,
        repository: &str,
        digest: &Digest,
    ) -> Result<(), RegistryError> {
        let mut state = self.lock();
        state.calls.push(RegistryCall::DeleteManifest {
            repository: repository.to_string(),
            digest: digest.clone(),
        });
        if state.failing_manifests.contains(digest) {
            return Err(RegistryError::Service {
                status: 500,
                message: format!("injected failure deleting {repository}@{digest}"),
            });
        }

        let manifests = state
            .repositories
            .iter_mut()
            .find(|(name, _)| name == repository)
            .map(|(_, manifests)| manifests)
            .ok_or_else(|| RegistryError::NotFound(repository.to_string()))?;
        let before = manifests.len();
        manifests.retain(|m| &m.digest != digest);
        if manifests.len() == before {
            return Err(RegistryError::NotFound(format!("{repository}@{digest}")));
        }
        Ok(())
    }
}

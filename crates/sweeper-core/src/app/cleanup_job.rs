//! RetentionCleanupJob - レジストリ全体の retention sweep
//!
//! # フロー
//! 1. cutoff = now - retention_days（run ごとに 1 回だけ計算）
//! 2. repository を列挙（順序は collaborator 次第）
//! 3. 各 repository の manifest を新しい順に列挙
//! 4. classify → Stale なら tag を全部削除してから manifest を削除
//! 5. CleanupResult に記録して返す
//!
//! # 学習ポイント
//! - 計上は「分類」時点で行う（物理削除の成否とは独立）
//! - 削除の失敗は failed_deletions に積んで sweep は続行
//! - 列挙の失敗は途中結果を持った CleanupError として返す

use chrono::{DateTime, Utc};
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cancel::CancelSignal;
use crate::domain::{
    ArtifactManifest, Classification, CleanupResult, ErrorKind, FailedDeletion, RegistryError,
    RetentionPolicy, RunStatus, SweepMode, classify,
};
use crate::ports::{Clock, RegistryClient};

/// sweep の実行オプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOptions {
    pub mode: SweepMode,

    /// 最初の Retained で repository の列挙を打ち切る。
    /// newest-first の順序が厳密に単調なレジストリでのみ有効にすること。
    pub early_stop: bool,
}

impl SweepOptions {
    pub fn dry_run() -> Self {
        Self {
            mode: SweepMode::DryRun,
            ..Self::default()
        }
    }

    pub fn with_early_stop(mut self, early_stop: bool) -> Self {
        self.early_stop = early_stop;
        self
    }
}

/// CleanupError は sweep を途中で終わらせたエラー
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("registry enumeration failed: {source}")]
    Enumeration {
        #[source]
        source: RegistryError,
        /// 失敗までに分類できた分（status = Aborted）
        partial: Box<CleanupResult>,
    },
}

impl CleanupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CleanupError::Enumeration { source, .. } => source.kind(),
        }
    }

    pub fn partial(&self) -> &CleanupResult {
        match self {
            CleanupError::Enumeration { partial, .. } => partial,
        }
    }

    pub fn into_partial(self) -> CleanupResult {
        match self {
            CleanupError::Enumeration { partial, .. } => *partial,
        }
    }
}

/// repository 1 件を処理した後の続行判定
enum Flow {
    Continue,
    Cancelled,
}

/// RetentionCleanupJob は 1 回の sweep を実行する
///
/// # 使用例
/// ```ignore
/// let job = RetentionCleanupJob::new(SystemClock, SweepOptions::default());
/// let result = job.run(&RetentionPolicy::new(30), &registry).await?;
/// println!("{}", result.summary());
/// ```
///
/// job は policy も client も保持しない。同時に複数の run を走らせてよい。
pub struct RetentionCleanupJob<C> {
    clock: C,
    options: SweepOptions,
}

impl<C: Clock> RetentionCleanupJob<C> {
    pub fn new(clock: C, options: SweepOptions) -> Self {
        Self { clock, options }
    }

    pub async fn run(
        &self,
        policy: &RetentionPolicy,
        client: &dyn RegistryClient,
    ) -> Result<CleanupResult, CleanupError> {
        self.run_until_cancelled(policy, client, &CancelSignal::never())
            .await
    }

    /// キャンセルされた場合は `status = Cancelled` の途中結果を `Ok` で返す
    pub async fn run_until_cancelled(
        &self,
        policy: &RetentionPolicy,
        client: &dyn RegistryClient,
        cancel: &CancelSignal,
    ) -> Result<CleanupResult, CleanupError> {
        let cutoff = policy.cutoff(self.clock.now());
        let mut result = CleanupResult::new(self.options.mode);

        info!(
            %cutoff,
            retention_days = policy.retention_days,
            mode = ?self.options.mode,
            early_stop = self.options.early_stop,
            "searching for artifacts older than cutoff"
        );

        let mut repositories = client.list_repository_names();
        loop {
            if cancel.is_cancelled() {
                result.status = RunStatus::Cancelled;
                break;
            }
            let Some(next) = repositories.next().await else {
                break;
            };
            let repository = match next {
                Ok(name) => name,
                Err(e) => return Err(abort(result, e)),
            };

            result.repositories_scanned += 1;
            match self
                .sweep_repository(client, &repository, cutoff, cancel, &mut result)
                .await
            {
                Ok(Flow::Continue) => {}
                Ok(Flow::Cancelled) => {
                    result.status = RunStatus::Cancelled;
                    break;
                }
                Err(e) => return Err(abort(result, e)),
            }
        }

        info!(
            deleted = result.deleted_images.len(),
            ignored = result.ignored_images.len(),
            failed = result.failed_deletions.len(),
            repositories = result.repositories_scanned,
            status = ?result.status,
            "cleanup finished"
        );
        Ok(result)
    }

    async fn sweep_repository(
        &self,
        client: &dyn RegistryClient,
        repository: &str,
        cutoff: DateTime<Utc>,
        cancel: &CancelSignal,
        result: &mut CleanupResult,
    ) -> Result<Flow, RegistryError> {
        debug!(repository, "scanning repository");

        let mut manifests = client.list_manifests(repository);
        loop {
            if cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }
            let Some(next) = manifests.next().await else {
                break;
            };
            let manifest = next?;

            match classify(&manifest, cutoff) {
                Classification::Stale => {
                    result.record_deleted(manifest.digest.clone());
                    self.delete_artifact(client, repository, &manifest, result)
                        .await;
                }
                Classification::Retained => {
                    result.record_ignored(manifest.digest.clone());
                    if self.options.early_stop {
                        debug!(
                            repository,
                            digest = %manifest.digest,
                            "first retained artifact reached, skipping the rest of the repository"
                        );
                        break;
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// tag を全て（registry の報告順に）削除してから manifest を削除する
    async fn delete_artifact(
        &self,
        client: &dyn RegistryClient,
        repository: &str,
        manifest: &ArtifactManifest,
        result: &mut CleanupResult,
    ) {
        let digest = &manifest.digest;
        let artifact = manifest.reference();

        if self.options.mode == SweepMode::DryRun {
            for tag in &manifest.tags {
                info!(repository, %digest, tag = %tag, "dry run: would delete tag {repository}:{tag}");
            }
            info!(
                %artifact,
                last_updated_on = %manifest.last_updated_on,
                "dry run: would delete manifest"
            );
            return;
        }

        for tag in &manifest.tags {
            info!(repository, %digest, tag = %tag, "deleting tag {repository}:{tag}");
            if let Err(e) = client.delete_tag(repository, digest, tag).await {
                warn!(repository, %digest, tag = %tag, error = %e, "tag deletion failed");
                result.record_failure(FailedDeletion {
                    repository: repository.to_string(),
                    digest: digest.clone(),
                    tag: Some(tag.clone()),
                    reason: e.to_string(),
                });
            }
        }

        info!(
            %artifact,
            last_updated_on = %manifest.last_updated_on,
            "deleting manifest"
        );
        if let Err(e) = client.delete_manifest(repository, digest).await {
            warn!(%artifact, error = %e, "manifest deletion failed");
            result.record_failure(FailedDeletion {
                repository: repository.to_string(),
                digest: digest.clone(),
                tag: None,
                reason: e.to_string(),
            });
        }
    }
}

fn abort(mut result: CleanupResult, source: RegistryError) -> CleanupError {
    result.status = RunStatus::Aborted;
    warn!(
        error = %source,
        deleted = result.deleted_images.len(),
        ignored = result.ignored_images.len(),
        "registry enumeration failed, returning partial result"
    );
    CleanupError::Enumeration {
        source,
        partial: Box::new(result),
    }
}

//! sweeper-core
//!
//! Retention sweep for container image registries: list repositories, walk
//! their manifests newest first, and delete the ones last updated before
//! `now - retention_days`.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（manifest, policy, result, errors）
//! - **ports**: 抽象化レイヤー（RegistryClient, TokenCredential, Clock）
//! - **app**: アプリケーションロジック（RetentionCleanupJob, CancelSignal）
//! - **impls**: 実装（InMemoryRegistry, AcrRegistryClient, credentials）
//! - **config**: 環境変数からの設定読み込み

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{CancelHandle, CancelSignal, CleanupError, RetentionCleanupJob, SweepOptions};
pub use config::{ConfigError, SweeperConfig};
pub use domain::{
    ArtifactManifest, CleanupResult, Digest, RegistryError, RetentionPolicy, RunStatus, SweepMode,
};

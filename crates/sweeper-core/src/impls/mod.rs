//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryRegistry**: テスト・デモ用のレジストリ
//! - **AcrRegistryClient**: ACR 互換 REST API（reqwest）
//! - **ClientSecretCredential / StaticTokenCredential**: TokenCredential

pub mod acr;
pub mod credential;
pub mod in_memory_registry;

// 主要な型を再エクスポート
pub use self::acr::AcrRegistryClient;
pub use self::credential::{ClientSecretCredential, StaticTokenCredential};
pub use self::in_memory_registry::{InMemoryRegistry, RegistryCall};

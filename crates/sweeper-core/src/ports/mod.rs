//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! sweep のコアはここにある trait だけを通して外部（レジストリ、時計、認証）に触れます。

pub mod clock;
pub mod credential;
pub mod registry;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::credential::TokenCredential;
pub use self::registry::{RegistryClient, RegistryStream};

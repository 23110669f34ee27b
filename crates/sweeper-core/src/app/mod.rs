//! App - アプリケーション層
//!
//! ports を組み合わせて sweep を実装します。
//!
//! # 主要コンポーネント
//! - **RetentionCleanupJob**: retention sweep 本体
//! - **CancelSignal**: repository / artifact 境界での協調的キャンセル

pub mod cancel;
pub mod cleanup_job;

// 主要な型を再エクスポート
pub use self::cancel::{CancelHandle, CancelSignal};
pub use self::cleanup_job::{CleanupError, RetentionCleanupJob, SweepOptions};

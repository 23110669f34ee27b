//! CancelSignal - sweep の協調的キャンセル
//!
//! watch channel の受信側を包んだだけのもの。sweep は repository / artifact の
//! 境界でだけ確認する（tag 削除と manifest 削除の間では確認しない）。

use tokio::sync::watch;

/// CancelHandle を drop してもキャンセル扱いにはならない
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // receivers may already be dropped
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// Never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn channel() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

//! Cooperative cancellation for long-running operations.
//!
//! A [`Cancel`] / [`Token`] pair connects the party that decides to stop
//! work with the parties performing it. Transactions accept a token at
//! commit; the tar reader observes one for its whole lifetime.

use tokio::sync::watch;

use crate::error::{ErrorKind, FsError};

/// Cancellation side of the pair. Cloning shares the same signal.
#[derive(Clone)]
pub struct Cancel {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl Cancel {
    /// Creates a connected pair.
    pub fn new() -> (Cancel, Token) {
        let (tx, rx) = watch::channel(false);
        let tx = std::sync::Arc::new(tx);
        (Cancel { tx: tx.clone() }, Token { _tx: Some(tx), rx })
    }

    /// Fires the signal. All tokens observe it; firing twice is harmless.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of the pair.
#[derive(Clone)]
pub struct Token {
    // Kept alive so a background token never reports a dropped sender.
    _tx: Option<std::sync::Arc<watch::Sender<bool>>>,
    rx: watch::Receiver<bool>,
}

impl Token {
    /// A token that never fires.
    pub fn background() -> Token {
        let (tx, rx) = watch::channel(false);
        Token { _tx: Some(std::sync::Arc::new(tx)), rx }
    }

    /// True once the paired [`Cancel`] has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the paired [`Cancel`] fires. If the cancel side is
    /// gone without firing, the future never resolves.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// The error reported by operations abandoned through this token.
    pub fn error(&self) -> FsError {
        FsError::Kind(ErrorKind::Canceled)
    }
}

//! Cancellation shared between the session loop and whatever stops it.
//!
//! [`CancelToken`] is cloned into the Ctrl+C watcher thread; the session loop
//! only ever reads it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also report cancellation once `after` has elapsed from now.
    pub fn with_deadline(mut self, after: Duration) -> Self {
        self.deadline = Some(Instant::now() + after);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// Trip `token` on the first Ctrl+C.
///
/// The signal is awaited on a single-threaded tokio runtime owned by a
/// detached helper thread. Once installed, Ctrl+C no longer kills the process,
/// so install this only when something is polling the token.
pub fn cancel_on_ctrl_c(token: &CancelToken) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start signal runtime")?;

    let token = token.clone();
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        log::debug!("Ctrl+C received");
                        token.cancel();
                    }
                    Err(e) => log::error!("Failed to listen for Ctrl+C: {}", e),
                }
            });
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let watcher = token.clone();
        token.cancel();
        assert!(watcher.is_cancelled());
    }

    #[test]
    fn test_deadline_expires() {
        let token = CancelToken::new().with_deadline(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(30));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_distant_deadline_does_not_cancel() {
        let token = CancelToken::new().with_deadline(Duration::from_secs(3600));
        assert!(!token.is_cancelled());
    }
}

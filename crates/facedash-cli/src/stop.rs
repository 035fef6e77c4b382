//! Ctrl-C handling shared by every long-running command.
//!
//! The first SIGINT sets a flag that stays set, so work that is busy when
//! the signal lands still sees it. A second SIGINT exits immediately.

use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct StopFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl StopFlag {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Register the SIGINT handler now and return a flag it sets.
    pub fn install() -> std::io::Result<Self> {
        let mut interrupts = signal(SignalKind::interrupt())?;
        let flag = Self::new();
        let trigger = flag.clone();
        tokio::spawn(async move {
            if interrupts.recv().await.is_none() {
                return;
            }
            tracing::info!("interrupted, stopping (press Ctrl-C again to exit now)");
            trigger.trigger();
            if interrupts.recv().await.is_some() {
                std::process::exit(130);
            }
        });
        Ok(flag)
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is set, immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_after_trigger_returns() {
        let flag = StopFlag::new();
        assert!(!flag.is_set());
        flag.trigger();
        assert!(flag.is_set());
        // set before anyone waited; must not be lost
        tokio::time::timeout(Duration::from_secs(1), flag.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let flag = StopFlag::new();
        let waiter = flag.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        tokio::task::yield_now().await;
        flag.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_sigint_sets_flag() {
        let flag = StopFlag::install().unwrap();
        let status = std::process::Command::new("kill")
            .args(["-INT", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
        tokio::time::timeout(Duration::from_secs(2), flag.wait())
            .await
            .unwrap();
        assert!(flag.is_set());
    }
}

//! Operator checkpoints.
//!
//! The crawler stops at two points and waits for a human: after the first
//! page load (to clear consent dialogs) and after a page fails (to inspect
//! or unblock the session). Both resume the same run.

use std::io::BufRead;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use console::style;
use tracing::{info, warn};

/// Where the crawler is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// First page loaded; interstitial UI may need dismissing.
    SessionStart,
    /// A page failed and will be retried.
    PageRecovery,
}

/// Capability the crawler blocks on until a human acknowledges.
#[async_trait]
pub trait OperatorSignal: Send + Sync {
    async fn acknowledge(&self, checkpoint: Checkpoint, message: &str);
}

/// Prompts on the terminal and waits for Enter.
#[derive(Debug, Default)]
pub struct ConsoleOperator;

#[async_trait]
impl OperatorSignal for ConsoleOperator {
    async fn acknowledge(&self, _checkpoint: Checkpoint, message: &str) {
        eprintln!(
            "\n{} {}",
            style(message).yellow().bold(),
            style("Press Enter to continue...").dim()
        );

        let read = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| ())
        })
        .await;

        match read {
            Ok(Ok(())) => info!("Resumed after operator action: {}", message),
            Ok(Err(e)) => warn!("Could not read operator input ({}), continuing", e),
            Err(e) => warn!("Operator prompt task failed ({}), continuing", e),
        }
    }
}

/// Confirms every checkpoint immediately. Used for unattended runs and tests.
#[derive(Debug, Default)]
pub struct AutoConfirm {
    acknowledged: AtomicUsize,
    recoveries: AtomicUsize,
}

impl AutoConfirm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checkpoints confirmed so far.
    pub fn acknowledged(&self) -> usize {
        self.acknowledged.load(Ordering::SeqCst)
    }

    /// Page-recovery checkpoints confirmed so far.
    pub fn recoveries(&self) -> usize {
        self.recoveries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperatorSignal for AutoConfirm {
    async fn acknowledge(&self, checkpoint: Checkpoint, message: &str) {
        self.acknowledged.fetch_add(1, Ordering::SeqCst);
        if checkpoint == Checkpoint::PageRecovery {
            self.recoveries.fetch_add(1, Ordering::SeqCst);
        }
        info!("Auto-confirmed checkpoint {:?}: {}", checkpoint, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auto_confirm_counts() {
        let operator = AutoConfirm::new();
        operator
            .acknowledge(Checkpoint::SessionStart, "close popups")
            .await;
        operator
            .acknowledge(Checkpoint::PageRecovery, "check the page")
            .await;
        assert_eq!(operator.acknowledged(), 2);
        assert_eq!(operator.recoveries(), 1);
    }
}

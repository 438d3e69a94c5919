//! Crawl state machine.

use std::fmt;

use tracing::debug;

/// Where a single crawl attempt is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Init,
    Bootstrapping,
    SeekStartPage { target: u32 },
    PageLoop { page: u32 },
    Recovering { page: u32 },
    Done,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlState::Init => write!(f, "init"),
            CrawlState::Bootstrapping => write!(f, "bootstrapping"),
            CrawlState::SeekStartPage { target } => write!(f, "seek-start-page({})", target),
            CrawlState::PageLoop { page } => write!(f, "page-loop({})", page),
            CrawlState::Recovering { page } => write!(f, "recovering({})", page),
            CrawlState::Done => write!(f, "done"),
        }
    }
}

/// Current state plus the path taken to reach it.
#[derive(Debug, Clone)]
pub struct StateTracker {
    current: CrawlState,
    history: Vec<CrawlState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            current: CrawlState::Init,
            history: vec![CrawlState::Init],
        }
    }

    pub fn current(&self) -> CrawlState {
        self.current
    }

    pub fn history(&self) -> &[CrawlState] {
        &self.history
    }

    pub fn enter(&mut self, next: CrawlState) {
        debug!("Crawl state: {} -> {}", self.current, next);
        self.current = next;
        self.history.push(next);
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_records_transitions() {
        let mut tracker = StateTracker::new();
        tracker.enter(CrawlState::Bootstrapping);
        tracker.enter(CrawlState::PageLoop { page: 1 });
        tracker.enter(CrawlState::Recovering { page: 1 });
        tracker.enter(CrawlState::PageLoop { page: 1 });
        tracker.enter(CrawlState::Done);

        assert_eq!(tracker.current(), CrawlState::Done);
        assert_eq!(tracker.history().len(), 6);
        assert_eq!(tracker.history()[3], CrawlState::Recovering { page: 1 });
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CrawlState::PageLoop { page: 4 }.to_string(), "page-loop(4)");
        assert_eq!(
            CrawlState::SeekStartPage { target: 3 }.to_string(),
            "seek-start-page(3)"
        );
    }
}

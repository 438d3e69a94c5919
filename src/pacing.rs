//! Human-like pacing: jittered pauses and random scroll steps.
//!
//! All randomness in the crawler flows through a [`Pacer`], so tests can use
//! a seeded source and skip the actual sleeping.

use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Inclusive pause range in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl JitterRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    fn bounds(&self) -> RangeInclusive<u64> {
        let lo = self.min_ms.min(self.max_ms);
        let hi = self.min_ms.max(self.max_ms);
        lo..=hi
    }
}

/// Pause ranges used around navigation and scrolling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    /// After moving the pointer onto a page control.
    pub hover: JitterRange,
    /// After clicking a page control.
    pub click_settle: JitterRange,
    /// After loading a page URL directly.
    pub url_settle: JitterRange,
    /// Between finishing one page and starting the next.
    pub between_pages: JitterRange,
    /// Between scroll steps.
    pub scroll_pause: JitterRange,
    /// Smallest scroll step in pixels.
    pub scroll_step_min: u64,
    /// Largest scroll step in pixels.
    pub scroll_step_max: u64,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            hover: JitterRange::new(500, 1000),
            click_settle: JitterRange::new(2000, 3000),
            url_settle: JitterRange::new(2000, 4000),
            between_pages: JitterRange::new(3000, 6000),
            scroll_pause: JitterRange::new(500, 1500),
            scroll_step_min: 100,
            scroll_step_max: 400,
        }
    }
}

/// Injectable source of jitter.
#[derive(Debug)]
pub struct Pacer {
    settings: PacingSettings,
    rng: Mutex<StdRng>,
    sleep: bool,
    paused: Mutex<Duration>,
}

impl Pacer {
    /// Pacer seeded from the operating system that really sleeps.
    pub fn new(settings: PacingSettings) -> Self {
        Self::build(settings, StdRng::from_os_rng(), true)
    }

    /// Deterministic pacer that really sleeps.
    pub fn seeded(settings: PacingSettings, seed: u64) -> Self {
        Self::build(settings, StdRng::seed_from_u64(seed), true)
    }

    /// Deterministic pacer that only records pauses. Used by tests.
    pub fn instant(seed: u64) -> Self {
        Self::build(PacingSettings::default(), StdRng::seed_from_u64(seed), false)
    }

    fn build(settings: PacingSettings, rng: StdRng, sleep: bool) -> Self {
        Self {
            settings,
            rng: Mutex::new(rng),
            sleep,
            paused: Mutex::new(Duration::ZERO),
        }
    }

    /// Uniform pick from an inclusive range.
    pub fn pick(&self, range: RangeInclusive<u64>) -> u64 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.random_range(range)
    }

    /// Random scroll step in pixels, never less than one.
    pub fn scroll_step(&self) -> u64 {
        let lo = self
            .settings
            .scroll_step_min
            .min(self.settings.scroll_step_max)
            .max(1);
        let hi = self
            .settings
            .scroll_step_min
            .max(self.settings.scroll_step_max)
            .max(lo);
        self.pick(lo..=hi)
    }

    /// Sleep for a random duration drawn from `range`. Returns the duration chosen.
    pub async fn pause(&self, range: JitterRange) -> Duration {
        let delay = Duration::from_millis(self.pick(range.bounds()));
        {
            let mut paused = self.paused.lock().unwrap_or_else(|e| e.into_inner());
            *paused += delay;
        }
        trace!("Pausing for {:?}", delay);
        if self.sleep {
            tokio::time::sleep(delay).await;
        }
        delay
    }

    pub async fn hover_pause(&self) -> Duration {
        self.pause(self.settings.hover).await
    }

    pub async fn click_pause(&self) -> Duration {
        self.pause(self.settings.click_settle).await
    }

    pub async fn url_pause(&self) -> Duration {
        self.pause(self.settings.url_settle).await
    }

    pub async fn page_pause(&self) -> Duration {
        self.pause(self.settings.between_pages).await
    }

    pub async fn scroll_pause(&self) -> Duration {
        self.pause(self.settings.scroll_pause).await
    }

    /// Total pause time requested so far.
    pub fn total_paused(&self) -> Duration {
        *self.paused.lock().unwrap_or_else(|e| e.into_inner())
    }
}

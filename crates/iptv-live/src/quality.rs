//! Closed-loop quality guard for the active stream.
//!
//! Called on a fixed tick with the stream's current telemetry.  Steps the
//! level down when the stream is struggling (repeated stalls, dropped frames,
//! a nearly empty buffer) and back up after a long enough healthy stretch.
//! Any manual selection freezes it until the next stream.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use iptv_proto::config::QualityConfig;
use iptv_proto::protocol::QualityLevel;
use tracing::{debug, info};

use crate::surface::AdaptiveStream;

#[derive(Debug, Clone)]
pub struct QualityTuning {
    pub stall_window: Duration,
    pub stall_retention: Duration,
    pub stall_threshold: usize,
    pub drop_ratio_limit: f64,
    pub low_buffer_secs: f64,
    pub step_up_after: Duration,
}

impl Default for QualityTuning {
    fn default() -> Self {
        Self::from(&QualityConfig::default())
    }
}

impl From<&QualityConfig> for QualityTuning {
    fn from(cfg: &QualityConfig) -> Self {
        Self {
            stall_window: Duration::from_secs(cfg.stall_window_secs),
            stall_retention: Duration::from_secs(cfg.stall_retention_secs),
            stall_threshold: cfg.stall_threshold,
            drop_ratio_limit: cfg.drop_ratio_limit,
            low_buffer_secs: cfg.low_buffer_secs,
            step_up_after: Duration::from_secs(cfg.step_up_after_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityDecision {
    Hold,
    /// `notify` is set when an explicit level was actually lowered, as
    /// opposed to falling back to automatic.
    StepDown {
        from: QualityLevel,
        to: QualityLevel,
        notify: bool,
    },
    StepUp {
        from: QualityLevel,
        to: QualityLevel,
    },
}

#[derive(Debug)]
pub struct QualityController {
    tuning: QualityTuning,
    stalls: VecDeque<Instant>,
    manual: bool,
    last_healthy: Instant,
    last_stall: Option<Instant>,
}

impl QualityController {
    pub fn new(tuning: QualityTuning, now: Instant) -> Self {
        Self {
            tuning,
            stalls: VecDeque::new(),
            manual: false,
            last_healthy: now,
            last_stall: None,
        }
    }

    /// Fresh state for a new stream URL.
    pub fn reset(&mut self, now: Instant) {
        self.stalls.clear();
        self.manual = false;
        self.last_healthy = now;
        self.last_stall = None;
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    pub fn on_stall(&mut self, now: Instant) {
        self.stalls.push_back(now);
        self.last_stall = Some(now);
        self.prune(now);
    }

    /// Apply a user choice.  Freezes the controller until [`reset`](Self::reset).
    pub fn select_manual(&mut self, stream: &mut dyn AdaptiveStream, level: QualityLevel) {
        self.manual = true;
        stream.select_level(level);
        info!("quality: manual selection {}", level);
    }

    pub fn recent_stalls(&self, now: Instant) -> usize {
        self.stalls
            .iter()
            .filter(|t| now.saturating_duration_since(**t) <= self.tuning.stall_window)
            .count()
    }

    pub fn tick(&mut self, stream: &mut dyn AdaptiveStream, now: Instant) -> QualityDecision {
        self.prune(now);
        if self.manual {
            return QualityDecision::Hold;
        }

        let recent = self.recent_stalls(now);
        let ahead = stream.buffered_ahead();
        let drop_ratio = stream
            .frame_stats()
            .and_then(|f| f.drop_ratio())
            .unwrap_or(0.0);
        debug!(
            "quality: tick stalls={} ahead={:.2}s drop={:.3}",
            recent, ahead, drop_ratio
        );

        let struggling = recent >= self.tuning.stall_threshold
            || drop_ratio > self.tuning.drop_ratio_limit
            || (ahead > 0.0 && ahead < self.tuning.low_buffer_secs);

        if struggling {
            let from = stream.current_level();
            let (to, notify) = match from {
                QualityLevel::Level(n) if n > 0 => (QualityLevel::Level(n - 1), true),
                _ => (QualityLevel::Auto, false),
            };
            if to != from {
                stream.select_level(to);
            }
            self.stalls.clear();
            self.last_healthy = now;
            info!("quality: step down {} -> {}", from, to);
            return QualityDecision::StepDown { from, to, notify };
        }

        // a stall restarts the healthy stretch even after it left the window
        let quiet_since = self
            .last_stall
            .map_or(self.last_healthy, |t| t.max(self.last_healthy));
        let mut decision = QualityDecision::Hold;
        if now.saturating_duration_since(quiet_since) >= self.tuning.step_up_after {
            if recent == 0 {
                let from = stream.current_level();
                if let QualityLevel::Level(n) = from {
                    if n + 1 < stream.level_count() {
                        let to = QualityLevel::Level(n + 1);
                        stream.select_level(to);
                        self.last_healthy = now;
                        info!("quality: step up {} -> {}", from, to);
                        decision = QualityDecision::StepUp { from, to };
                    }
                }
            } else {
                self.last_healthy = now;
            }
        }

        if recent == 0 && ahead >= self.tuning.low_buffer_secs {
            self.last_healthy = now;
        }
        decision
    }

    fn prune(&mut self, now: Instant) {
        while self
            .stalls
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) > self.tuning.stall_retention)
        {
            self.stalls.pop_front();
        }
    }
}

//! The adaptive-stream client as seen by the quality controller.

use iptv_proto::protocol::{BufferedRange, QualityLevel, SurfaceTelemetry};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    pub dropped: u64,
    pub total: u64,
}

impl FrameStats {
    pub fn drop_ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| self.dropped as f64 / self.total as f64)
    }
}

/// Narrow control surface of an adaptive stream.  Stall events are not part
/// of it: they reach the core as events tagged with the stream generation.
pub trait AdaptiveStream {
    fn level_count(&self) -> usize;
    fn current_level(&self) -> QualityLevel;
    fn select_level(&mut self, level: QualityLevel);
    /// Seconds buffered ahead of the playhead.
    fn buffered_ahead(&self) -> f64;
    /// `None` when the platform does not expose frame counters.
    fn frame_stats(&self) -> Option<FrameStats>;
}

/// Buffered seconds ahead of `playhead`.  Uses the range that covers the
/// playhead; if none does, measures to the end of the last range instead so a
/// fresh seek or switch does not read as an empty buffer.
pub fn buffered_ahead(ranges: &[BufferedRange], playhead: f64) -> f64 {
    let covering = ranges
        .iter()
        .find(|r| r.start <= playhead && playhead <= r.end)
        .map(|r| r.end - playhead);
    match covering {
        Some(ahead) if ahead > 0.0 => ahead,
        _ => ranges.last().map(|r| r.end - playhead).unwrap_or(0.0),
    }
}

/// Surface driven over the remote-control API by an embedding player.
///
/// Telemetry is pushed in; level selection is only recorded here and reaches
/// the player through the published snapshot.
#[derive(Debug, Clone, Default)]
pub struct RemoteSurface {
    telemetry: SurfaceTelemetry,
    selected: QualityLevel,
}

impl RemoteSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, telemetry: SurfaceTelemetry) {
        self.telemetry = telemetry;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn telemetry(&self) -> &SurfaceTelemetry {
        &self.telemetry
    }
}

impl AdaptiveStream for RemoteSurface {
    fn level_count(&self) -> usize {
        self.telemetry.level_count
    }

    fn current_level(&self) -> QualityLevel {
        self.selected
    }

    fn select_level(&mut self, level: QualityLevel) {
        self.selected = level;
    }

    fn buffered_ahead(&self) -> f64 {
        buffered_ahead(&self.telemetry.buffered, self.telemetry.playhead)
    }

    fn frame_stats(&self) -> Option<FrameStats> {
        (self.telemetry.total_frames > 0).then_some(FrameStats {
            dropped: self.telemetry.dropped_frames,
            total: self.telemetry.total_frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: f64, end: f64) -> BufferedRange {
        BufferedRange { start, end }
    }

    #[test]
    fn test_buffered_ahead_covering_range() {
        let ranges = [r(0.0, 4.0), r(10.0, 18.0)];
        assert_eq!(buffered_ahead(&ranges, 12.0), 6.0);
    }

    #[test]
    fn test_buffered_ahead_falls_back_to_last_range() {
        // playhead sits in a gap right after a switch
        let ranges = [r(0.0, 4.0), r(10.0, 18.0)];
        assert_eq!(buffered_ahead(&ranges, 7.0), 11.0);
        assert_eq!(buffered_ahead(&[], 7.0), 0.0);
    }

    #[test]
    fn test_remote_surface_reports_pushed_state() {
        let mut surface = RemoteSurface::new();
        surface.update(SurfaceTelemetry {
            level_count: 4,
            playhead: 1.0,
            buffered: vec![r(0.0, 6.0)],
            dropped_frames: 3,
            total_frames: 100,
            ..SurfaceTelemetry::default()
        });
        surface.select_level(QualityLevel::Level(2));
        assert_eq!(surface.level_count(), 4);
        assert_eq!(surface.current_level(), QualityLevel::Level(2));
        assert_eq!(surface.buffered_ahead(), 5.0);
        assert_eq!(surface.frame_stats().unwrap().drop_ratio(), Some(0.03));
        surface.reset();
        assert_eq!(surface.current_level(), QualityLevel::Auto);
        assert!(surface.frame_stats().is_none());
    }
}

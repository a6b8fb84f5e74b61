//! Transient overlay notices, one slot per kind.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use iptv_proto::protocol::{NoticeKind, NoticeView};

pub const CHANNEL_NOT_FOUND_NOTICE: Duration = Duration::from_millis(1800);
pub const FAVORITE_NOTICE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
struct NoticeSlot {
    message: String,
    /// `None` keeps the notice until dismissed.
    expires: Option<Instant>,
}

impl NoticeSlot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires.is_some_and(|t| t <= now)
    }
}

#[derive(Debug, Default)]
pub struct NoticeBoard {
    slots: BTreeMap<NoticeKind, NoticeSlot>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `message` for `duration`, replacing any notice of the same kind.
    pub fn show(
        &mut self,
        kind: NoticeKind,
        message: impl Into<String>,
        now: Instant,
        duration: Duration,
    ) {
        self.slots.insert(
            kind,
            NoticeSlot {
                message: message.into(),
                expires: Some(now + duration),
            },
        );
    }

    pub fn show_persistent(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.slots.insert(
            kind,
            NoticeSlot {
                message: message.into(),
                expires: None,
            },
        );
    }

    pub fn dismiss(&mut self, kind: NoticeKind) -> bool {
        self.slots.remove(&kind).is_some()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Drop expired notices.  Returns true when anything was removed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(now));
        self.slots.len() != before
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.slots.values().filter_map(|s| s.expires).min()
    }

    pub fn is_showing(&self, kind: NoticeKind) -> bool {
        self.slots.contains_key(&kind)
    }

    pub fn message(&self, kind: NoticeKind) -> Option<&str> {
        self.slots.get(&kind).map(|s| s.message.as_str())
    }

    pub fn views(&self) -> Vec<NoticeView> {
        self.slots
            .iter()
            .map(|(kind, slot)| NoticeView {
                kind: *kind,
                message: slot.message.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_kind_supersedes() {
        let mut board = NoticeBoard::new();
        let t0 = Instant::now();
        board.show(NoticeKind::Favorite, "Added to favorites", t0, FAVORITE_NOTICE);
        board.show(
            NoticeKind::Favorite,
            "Removed from favorites",
            t0 + Duration::from_secs(1),
            FAVORITE_NOTICE,
        );
        assert_eq!(board.views().len(), 1);
        assert_eq!(
            board.message(NoticeKind::Favorite),
            Some("Removed from favorites")
        );
        // the first expiry no longer applies
        assert!(!board.tick(t0 + Duration::from_millis(1600)));
        assert!(board.tick(t0 + Duration::from_millis(2600)));
        assert!(board.views().is_empty());
    }

    #[test]
    fn test_views_list_unavailable_first() {
        let mut board = NoticeBoard::new();
        let t0 = Instant::now();
        board.show(NoticeKind::Favorite, "Added to favorites", t0, FAVORITE_NOTICE);
        board.show_persistent(NoticeKind::StreamUnavailable, "Stream unavailable");
        let kinds: Vec<NoticeKind> = board.views().iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![NoticeKind::StreamUnavailable, NoticeKind::Favorite]);
    }

    #[test]
    fn test_persistent_notice_survives_tick() {
        let mut board = NoticeBoard::new();
        let t0 = Instant::now();
        board.show_persistent(NoticeKind::StreamUnavailable, "Stream unavailable");
        board.show(
            NoticeKind::ChannelNotFound,
            "Channel not found",
            t0,
            CHANNEL_NOT_FOUND_NOTICE,
        );
        assert_eq!(board.next_expiry(), Some(t0 + CHANNEL_NOT_FOUND_NOTICE));
        board.tick(t0 + Duration::from_secs(60));
        assert!(board.is_showing(NoticeKind::StreamUnavailable));
        assert!(!board.is_showing(NoticeKind::ChannelNotFound));
        assert!(board.dismiss(NoticeKind::StreamUnavailable));
        assert_eq!(board.next_expiry(), None);
    }
}

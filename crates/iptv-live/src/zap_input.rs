//! Remote-control key handling while the player overlay is up.
//!
//! A reducer: keys and timer expiries go in, a [`ZapAction`] for the core
//! comes out.  The only timers it owns are the numeric-entry debounce and the
//! Select hold detector, both kept in the core's [`Timers`].

use std::time::{Duration, Instant};

use iptv_proto::protocol::RemoteKey;
use tracing::debug;

use crate::scheduler::{TimerKind, Timers};

pub const NUMERIC_COMMIT_DELAY: Duration = Duration::from_secs(2);
pub const SELECT_HOLD_DELAY: Duration = Duration::from_millis(600);
pub const MAX_NUMERIC_DIGITS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Idle,
    NumericEntry,
    ListBrowsing,
}

/// What the core should do in response to a key or timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZapAction {
    /// Overlay state changed (or nothing happened); no session change.
    None,
    SwitchTo(usize),
    Next,
    Prev,
    HistoryBack,
    /// Numeric entry committed: switch to the channel with this number.
    CommitNumber(u32),
    ToggleFavorite,
    /// Leave fullscreen, stop any external player and close the session.
    Exit,
}

#[derive(Debug)]
pub struct ZapInput {
    buffer: String,
    list_highlight: Option<usize>,
    controls_visible: bool,
    /// Hold timer fired for the Select press in progress.
    held: bool,
    /// Release belonging to a press already consumed by the list.
    swallow_release: bool,
}

impl Default for ZapInput {
    fn default() -> Self {
        Self::new()
    }
}

impl ZapInput {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            list_highlight: None,
            controls_visible: true,
            held: false,
            swallow_release: false,
        }
    }

    pub fn mode(&self) -> InputMode {
        if self.list_highlight.is_some() {
            InputMode::ListBrowsing
        } else if !self.buffer.is_empty() {
            InputMode::NumericEntry
        } else {
            InputMode::Idle
        }
    }

    pub fn numeric_entry(&self) -> &str {
        &self.buffer
    }

    pub fn list_highlight(&self) -> Option<usize> {
        self.list_highlight
    }

    pub fn controls_visible(&self) -> bool {
        self.controls_visible
    }

    /// Drop all transient input state and its timers.
    pub fn reset(&mut self, timers: &mut Timers<TimerKind>) {
        timers.cancel(TimerKind::NumericCommit);
        timers.cancel(TimerKind::SelectHold);
        self.buffer.clear();
        self.list_highlight = None;
        self.held = false;
        self.swallow_release = false;
    }

    pub fn on_key(
        &mut self,
        key: RemoteKey,
        list_len: usize,
        timers: &mut Timers<TimerKind>,
        now: Instant,
    ) -> ZapAction {
        debug!("zap input: {:?} in {:?}", key, self.mode());
        match key {
            RemoteKey::Digit(d) => {
                if self.buffer.len() < MAX_NUMERIC_DIGITS {
                    self.buffer.push(char::from(b'0' + d.min(9)));
                }
                timers.schedule(TimerKind::NumericCommit, now, NUMERIC_COMMIT_DELAY);
                ZapAction::None
            }
            RemoteKey::Erase if !self.buffer.is_empty() => {
                self.buffer.pop();
                if self.buffer.is_empty() {
                    timers.cancel(TimerKind::NumericCommit);
                } else {
                    timers.schedule(TimerKind::NumericCommit, now, NUMERIC_COMMIT_DELAY);
                }
                ZapAction::None
            }
            RemoteKey::Erase => ZapAction::HistoryBack,
            RemoteKey::Favorite => ZapAction::ToggleFavorite,
            RemoteKey::Escape if !self.buffer.is_empty() => {
                self.buffer.clear();
                timers.cancel(TimerKind::NumericCommit);
                ZapAction::None
            }
            RemoteKey::Escape => {
                self.reset(timers);
                ZapAction::Exit
            }
            // arrows never zap while a number is being typed
            RemoteKey::Up | RemoteKey::Down if !self.buffer.is_empty() => ZapAction::None,
            _ if self.list_highlight.is_some() => self.on_list_key(key, list_len, timers),
            RemoteKey::Up => ZapAction::Prev,
            RemoteKey::Down => ZapAction::Next,
            RemoteKey::SelectPressed => {
                self.held = false;
                timers.schedule(TimerKind::SelectHold, now, SELECT_HOLD_DELAY);
                ZapAction::None
            }
            RemoteKey::SelectReleased => {
                timers.cancel(TimerKind::SelectHold);
                let was_held = std::mem::take(&mut self.held);
                if std::mem::take(&mut self.swallow_release) {
                    return ZapAction::None;
                }
                if !was_held {
                    self.controls_visible = !self.controls_visible;
                }
                ZapAction::None
            }
        }
    }

    fn on_list_key(
        &mut self,
        key: RemoteKey,
        list_len: usize,
        timers: &mut Timers<TimerKind>,
    ) -> ZapAction {
        let Some(highlight) = self.list_highlight else {
            return ZapAction::None;
        };
        match key {
            RemoteKey::Up => {
                self.list_highlight = Some(highlight.saturating_sub(1));
                ZapAction::None
            }
            RemoteKey::Down => {
                let last = list_len.saturating_sub(1);
                self.list_highlight = Some((highlight + 1).min(last));
                ZapAction::None
            }
            RemoteKey::SelectPressed => {
                timers.cancel(TimerKind::SelectHold);
                self.list_highlight = None;
                self.swallow_release = true;
                ZapAction::SwitchTo(highlight)
            }
            // release of the press that opened the list
            RemoteKey::SelectReleased => {
                self.held = false;
                ZapAction::None
            }
            _ => ZapAction::None,
        }
    }

    /// React to an expired input timer.
    pub fn on_timer(&mut self, kind: TimerKind, current_index: usize) -> ZapAction {
        match kind {
            TimerKind::NumericCommit => {
                let entered = std::mem::take(&mut self.buffer);
                match entered.parse::<u32>() {
                    Ok(number) => ZapAction::CommitNumber(number),
                    Err(_) => ZapAction::None,
                }
            }
            TimerKind::SelectHold => {
                self.held = true;
                self.list_highlight = Some(current_index);
                ZapAction::None
            }
            _ => ZapAction::None,
        }
    }
}

//! Active channel list, current index and the derived stream.

use tracing::info;

use iptv_proto::protocol::{Channel, ChannelId, Credentials, ZapInfo};

use crate::zap_history::ZapHistory;

/// HLS URL of a live channel.  `None` without complete credentials.
pub fn live_stream_url(credentials: &Credentials, channel: ChannelId) -> Option<String> {
    if !credentials.is_complete() {
        return None;
    }
    Some(format!(
        "{}/live/{}/{}/{}.m3u8",
        credentials.base_url, credentials.username, credentials.password, channel
    ))
}

#[derive(Debug)]
pub struct LiveSession {
    credentials: Credentials,
    channels: Vec<Channel>,
    index: usize,
    visible: bool,
    url: Option<String>,
    title: String,
    zap: Option<ZapInfo>,
    /// Bumped every time a stream is (re)started or torn down.  Telemetry and
    /// timers carry it so work for a superseded stream can be recognised.
    generation: u64,
    history: ZapHistory,
}

impl LiveSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            channels: Vec::new(),
            index: 0,
            visible: false,
            url: None,
            title: String::new(),
            zap: None,
            generation: 0,
            history: ZapHistory::new(),
        }
    }

    /// Start a session on `channels` at `index` (clamped) and make it visible.
    pub fn open_live(&mut self, channels: Vec<Channel>, index: usize) {
        self.channels = channels;
        self.visible = true;
        if self.channels.is_empty() {
            self.index = 0;
            self.url = None;
            self.title.clear();
            self.zap = None;
            self.generation += 1;
            return;
        }
        self.activate(index.min(self.channels.len() - 1), true);
    }

    /// Jump to `index` (clamped) within the current list.  Returns true when
    /// the stream URL changed.
    pub fn switch_to(&mut self, index: usize) -> bool {
        if self.channels.is_empty() {
            return false;
        }
        self.activate(index.min(self.channels.len() - 1), false)
    }

    pub fn next(&mut self) -> bool {
        if self.channels.is_empty() {
            return false;
        }
        let idx = (self.index + 1) % self.channels.len();
        self.activate(idx, false)
    }

    pub fn prev(&mut self) -> bool {
        if self.channels.is_empty() {
            return false;
        }
        let len = self.channels.len();
        let idx = (self.index + len - 1) % len;
        self.activate(idx, false)
    }

    /// Hide the session.  List and index stay so a reopen can resume.
    pub fn close(&mut self) {
        if self.visible {
            info!("session: closed on index {}", self.index);
        }
        self.visible = false;
        self.generation += 1;
    }

    /// Restart the current URL under a new generation.  False when there is
    /// nothing to reload.
    pub fn reload(&mut self) -> bool {
        if !self.visible || self.url.is_none() {
            return false;
        }
        self.generation += 1;
        true
    }

    /// Zap back to the previously watched channel if it is in the list.
    pub fn history_back(&mut self) -> bool {
        let Some(prev) = self.history.back() else {
            return false;
        };
        match self.index_of(prev.id) {
            Some(idx) => self.switch_to(idx),
            None => false,
        }
    }

    pub fn index_of(&self, channel: ChannelId) -> Option<usize> {
        self.channels.iter().position(|c| c.id == channel)
    }

    pub fn index_of_number(&self, number: u32) -> Option<usize> {
        self.channels.iter().position(|c| c.number == Some(number))
    }

    fn activate(&mut self, idx: usize, force_reload: bool) -> bool {
        let Some(channel) = self.channels.get(idx).cloned() else {
            return false;
        };
        self.history.push(&channel);
        let url = live_stream_url(&self.credentials, channel.id);
        let changed = force_reload || url != self.url;
        self.index = idx;
        self.url = url;
        self.title = channel.name.clone();
        info!("session: zap to {} ({}) at index {}", channel.name, channel.id, idx);
        self.zap = Some(ZapInfo {
            channel,
            at_epoch_ms: chrono::Utc::now().timestamp_millis(),
        });
        if changed {
            self.generation += 1;
        }
        changed
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Channel> {
        self.channels.get(self.index)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn zap(&self) -> Option<&ZapInfo> {
        self.zap.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn history(&self) -> &ZapHistory {
        &self.history
    }
}

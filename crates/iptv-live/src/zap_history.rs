//! Recently watched channels, most recent first.

use std::collections::VecDeque;

use iptv_proto::protocol::Channel;

pub const ZAP_HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Default)]
pub struct ZapHistory {
    stack: VecDeque<Channel>,
}

impl ZapHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `channel` as the active one.  Re-pushing the current top is a
    /// no-op, so the stack never holds two consecutive identical ids.
    pub fn push(&mut self, channel: &Channel) {
        if self.stack.front().is_some_and(|top| top.id == channel.id) {
            return;
        }
        self.stack.push_front(channel.clone());
        self.stack.truncate(ZAP_HISTORY_CAPACITY);
    }

    /// Promote the previous channel to the top and return it.  Other copies of
    /// that channel deeper in the stack are dropped, and neighbours that end up
    /// adjacent with the same id are collapsed.  With fewer than two entries
    /// this returns `None` and leaves the stack alone.
    pub fn back(&mut self) -> Option<Channel> {
        if self.stack.len() < 2 {
            return None;
        }
        let prev = self.stack.get(1)?.clone();
        let mut rest: Vec<Channel> = self
            .stack
            .drain(..)
            .filter(|c| c.id != prev.id)
            .collect();
        rest.dedup_by_key(|c| c.id);
        self.stack = rest.into();
        self.stack.push_front(prev.clone());
        Some(prev)
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    pub fn top(&self) -> Option<&Channel> {
        self.stack.front()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.stack.iter().map(|c| c.id).collect()
    }
}

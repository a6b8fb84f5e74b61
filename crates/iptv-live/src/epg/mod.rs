//! Now/next program cache with bounded concurrent prefetch.
//!
//! Records are served stale until replaced; a missing record means the
//! channel was never fetched successfully.  Reads are synchronous so the
//! overlay never waits on the network.

mod panel;
mod time;

pub use panel::{epg_url, parse_now_next, EpgProgram, EpgRecord, EpgSource, PanelEpgSource};
pub use time::{parse_epg_time, parse_epg_time_str};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::{debug, info};

use iptv_proto::protocol::{Channel, ChannelId, Credentials};

pub const DEFAULT_EPG_CONCURRENCY: usize = 6;
pub const DEFAULT_EPG_REFRESH: Duration = Duration::from_secs(10 * 60);

pub struct EpgCache {
    source: Arc<dyn EpgSource>,
    credentials: Credentials,
    concurrency: usize,
    refresh_interval: Duration,
    records: RwLock<HashMap<ChannelId, EpgRecord>>,
    last_preload: Mutex<Option<Instant>>,
}

impl EpgCache {
    pub fn new(source: Arc<dyn EpgSource>, credentials: Credentials) -> Self {
        Self {
            source,
            credentials,
            concurrency: DEFAULT_EPG_CONCURRENCY,
            refresh_interval: DEFAULT_EPG_REFRESH,
            records: RwLock::new(HashMap::new()),
            last_preload: Mutex::new(None),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Last known record for `channel`, fresh or stale.
    pub fn get_for(&self, channel: ChannelId) -> Option<EpgRecord> {
        match self.records.read() {
            Ok(records) => records.get(&channel).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&channel).cloned(),
        }
    }

    pub fn is_fresh(&self, channel: ChannelId, now: Instant) -> bool {
        self.get_for(channel)
            .is_some_and(|r| r.age(now) < self.refresh_interval)
    }

    /// Fetch every channel that is not fresh.  A no-op within the refresh
    /// interval of the previous preload, or without complete credentials.
    /// Returns the number of requests issued.
    pub async fn preload(&self, channels: &[Channel]) -> usize {
        self.preload_at(channels, Instant::now()).await
    }

    pub async fn preload_at(&self, channels: &[Channel], now: Instant) -> usize {
        if !self.credentials.is_complete() {
            return 0;
        }
        {
            let mut last = self.lock_last_preload();
            if last.is_some_and(|t| now.saturating_duration_since(t) < self.refresh_interval) {
                debug!("EPG: preload skipped, last run is recent");
                return 0;
            }
            // stamp before the pool runs so concurrent callers back off
            *last = Some(now);
        }

        let ids: Vec<ChannelId> = channels
            .iter()
            .map(|c| c.id)
            .filter(|id| !self.is_fresh(*id, now))
            .collect();
        let issued = ids.len();
        let ok = self.fetch_all(ids).await;
        *self.lock_last_preload() = Some(Instant::now());
        info!("EPG: preload done, {}/{} channels updated", ok, issued);
        issued
    }

    /// Re-fetch every given channel regardless of the preload guard.
    pub async fn refresh(&self, channels: &[Channel]) -> usize {
        if !self.credentials.is_complete() {
            return 0;
        }
        let ids: Vec<ChannelId> = channels.iter().map(|c| c.id).collect();
        let issued = ids.len();
        let ok = self.fetch_all(ids).await;
        *self.lock_last_preload() = Some(Instant::now());
        info!("EPG: refresh done, {}/{} channels updated", ok, issued);
        issued
    }

    /// Drain `ids` with `concurrency` workers pulling from one shared cursor.
    /// A failed channel keeps whatever record it had.
    async fn fetch_all(&self, ids: Vec<ChannelId>) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let cursor = &AtomicUsize::new(0);
        let ids = &ids;
        let workers = (0..self.concurrency.min(ids.len())).map(move |_| async move {
            let mut updated = 0;
            loop {
                let i = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(&id) = ids.get(i) else {
                    break;
                };
                match self.source.fetch_now_next(&self.credentials, id).await {
                    Ok(record) => {
                        self.store(id, record);
                        updated += 1;
                    }
                    Err(e) => debug!("EPG: {}", e),
                }
            }
            updated
        });
        join_all(workers).await.into_iter().sum()
    }

    fn store(&self, channel: ChannelId, record: EpgRecord) {
        match self.records.write() {
            Ok(mut records) => {
                records.insert(channel, record);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(channel, record);
            }
        }
    }

    fn lock_last_preload(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_preload
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

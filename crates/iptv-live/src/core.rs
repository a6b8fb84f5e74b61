/// LiveCore: single-owner event loop for the live-channel engine.
///
/// Owns the session, zap history, quality controller, zap input machine,
/// notices and timers.  Every input (remote commands, keys, surface
/// telemetry, external player exits) arrives as a `LiveEvent` on one mpsc
/// channel; after each change the core rewrites the shared `LiveSnapshot`
/// and broadcasts `BroadcastMessage::StateUpdated`.
///
/// Timers are not tasks: the loop sleeps until the nearest deadline in
/// `Timers` (or the next notice expiry) and handles whatever is due.
use std::sync::Arc;
use std::time::{Duration, Instant};

use iptv_proto::catalog::Catalog;
use iptv_proto::config::Config;
use iptv_proto::protocol::{
    Channel, Credentials, LiveCommand, LiveSnapshot, NoticeKind, NoticeView, PlaybackStatus,
    SurfaceEvent, SurfaceTelemetry,
};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::epg::EpgCache;
use crate::favorites::FavoritesStore;
use crate::handoff::ExternalPlayer;
use crate::notice::{NoticeBoard, CHANNEL_NOT_FOUND_NOTICE, FAVORITE_NOTICE};
use crate::numbering::assign_session_numbers;
use crate::quality::{QualityController, QualityDecision, QualityTuning};
use crate::scheduler::{TimerKind, Timers};
use crate::session::LiveSession;
use crate::surface::{AdaptiveStream, RemoteSurface};
use crate::zap_input::{ZapAction, ZapInput};

// ── LiveEvent ─────────────────────────────────────────────────────────────────

/// All inputs into the LiveCore loop.
#[derive(Debug)]
pub enum LiveEvent {
    /// A command from the HTTP API or an embedding client.
    Command(LiveCommand),
    /// Discrete playback event from the surface.  `generation` of `None`
    /// means "the current stream".
    Surface {
        event: SurfaceEvent,
        generation: Option<u64>,
    },
    Telemetry(SurfaceTelemetry),
    /// The external player exited on its own.
    ExternalEnded { generation: u64 },
    Shutdown,
}

/// Everything the core announces to listeners.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// The snapshot changed; receivers should re-read it.
    StateUpdated,
    Notice(NoticeView),
    /// A new URL should be loaded (`None`: stop playback).
    StreamChanged {
        url: Option<String>,
        generation: u64,
    },
    /// The externally handed-off stream finished.
    PlaybackEnded,
    ExitFullscreen,
}

// ── settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CoreSettings {
    pub quality: QualityTuning,
    pub quality_tick: Duration,
    pub quality_notice: Duration,
    pub epg_refresh: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub fallback_on_failure: bool,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CoreSettings {
    fn from(config: &Config) -> Self {
        Self {
            quality: QualityTuning::from(&config.quality),
            quality_tick: config.quality.tick(),
            quality_notice: Duration::from_millis(config.quality.notice_millis),
            epg_refresh: config.epg.refresh_interval(),
            max_retries: config.player.max_retries,
            retry_delay: Duration::from_millis(config.player.retry_delay_millis),
            fallback_on_failure: config.player.fallback_on_failure,
        }
    }
}

// ── LiveCore ──────────────────────────────────────────────────────────────────

pub struct LiveCore {
    settings: CoreSettings,
    /// Numbered catalog handed to `open_live`.
    catalog: Vec<Channel>,
    session: LiveSession,
    quality: QualityController,
    surface: RemoteSurface,
    input: ZapInput,
    notices: NoticeBoard,
    timers: Timers<TimerKind>,
    epg: Arc<EpgCache>,
    epg_tasks: Vec<AbortHandle>,
    favorites: Box<dyn FavoritesStore>,
    player: Box<dyn ExternalPlayer>,
    /// Generation of the external playback we still expect an exit for.
    handoff_generation: Option<u64>,
    playback_status: PlaybackStatus,
    retry_attempt: u32,
    fullscreen: bool,
    rev: u64,
    snapshot: Arc<RwLock<LiveSnapshot>>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl LiveCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: CoreSettings,
        catalog: Catalog,
        credentials: Credentials,
        epg: Arc<EpgCache>,
        favorites: Box<dyn FavoritesStore>,
        player: Box<dyn ExternalPlayer>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        let mut channels = catalog.channels;
        assign_session_numbers(&mut channels, &catalog.categories);
        info!("LiveCore: {} channels numbered", channels.len());

        let quality = QualityController::new(settings.quality.clone(), Instant::now());
        Self {
            settings,
            catalog: channels,
            session: LiveSession::new(credentials),
            quality,
            surface: RemoteSurface::new(),
            input: ZapInput::new(),
            notices: NoticeBoard::new(),
            timers: Timers::new(),
            epg,
            epg_tasks: Vec::new(),
            favorites,
            player,
            handoff_generation: None,
            playback_status: PlaybackStatus::Idle,
            retry_attempt: 0,
            fullscreen: false,
            rev: 0,
            snapshot: Arc::new(RwLock::new(LiveSnapshot::default())),
            broadcast_tx,
        }
    }

    /// Shared read-only view (for the HTTP server).
    pub fn snapshot(&self) -> Arc<RwLock<LiveSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    pub fn epg(&self) -> Arc<EpgCache> {
        Arc::clone(&self.epg)
    }

    pub fn session(&self) -> &LiveSession {
        &self.session
    }

    pub fn catalog(&self) -> &[Channel] {
        &self.catalog
    }

    pub fn playback_status(&self) -> &PlaybackStatus {
        &self.playback_status
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn surface(&self) -> &RemoteSurface {
        &self.surface
    }

    pub fn quality(&self) -> &QualityController {
        &self.quality
    }

    pub fn input(&self) -> &ZapInput {
        &self.input
    }

    pub fn timers(&self) -> &Timers<TimerKind> {
        &self.timers
    }

    /// Run the core event loop.  Returns on `Shutdown` or when every sender
    /// is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<LiveEvent>) -> anyhow::Result<()> {
        info!("LiveCore: starting event loop");
        self.publish().await;

        loop {
            let evt = match self.next_deadline() {
                Some(at) => {
                    tokio::select! {
                        evt = event_rx.recv() => evt,
                        _ = tokio::time::sleep_until(tokio::time::Instant::from_std(at)) => {
                            self.fire_due(Instant::now()).await;
                            continue;
                        }
                    }
                }
                None => event_rx.recv().await,
            };

            match evt {
                None => {
                    info!("LiveCore: event channel closed, shutting down");
                    break;
                }
                Some(LiveEvent::Shutdown) => {
                    info!("LiveCore: shutdown requested");
                    break;
                }
                Some(evt) => self.handle_event(evt, Instant::now()).await,
            }
        }

        self.teardown().await;
        Ok(())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.timers.next_deadline(), self.notices.next_expiry()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub async fn handle_event(&mut self, evt: LiveEvent, now: Instant) {
        match evt {
            LiveEvent::Command(cmd) => {
                info!("LiveCore: command {:?}", cmd);
                self.handle_command(cmd, now).await;
            }
            LiveEvent::Surface { event, generation } => {
                if !self.is_current_stream(generation) {
                    debug!("LiveCore: dropping {:?} for stale stream {:?}", event, generation);
                    return;
                }
                self.handle_surface_event(event, now).await;
            }
            LiveEvent::Telemetry(telemetry) => {
                if self.is_current_stream(telemetry.generation) {
                    self.surface.update(telemetry);
                }
            }
            LiveEvent::ExternalEnded { generation } => {
                if self.handoff_generation == Some(generation) {
                    info!("LiveCore: external playback #{} ended", generation);
                    self.handoff_generation = None;
                    let _ = self.broadcast_tx.send(BroadcastMessage::PlaybackEnded);
                } else {
                    debug!("LiveCore: ignoring exit of superseded handoff #{}", generation);
                }
            }
            LiveEvent::Shutdown => {}
        }
    }

    fn is_current_stream(&self, generation: Option<u64>) -> bool {
        self.session.is_visible()
            && self.session.url().is_some()
            && generation.map_or(true, |g| g == self.session.generation())
    }

    // ── commands ──────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: LiveCommand, now: Instant) {
        match cmd {
            LiveCommand::Open { index } => {
                self.input.reset(&mut self.timers);
                self.session.open_live(self.catalog.clone(), index);
                self.on_stream_changed(now).await;
                self.start_epg(now);
                self.publish().await;
            }
            LiveCommand::SwitchTo { index } => {
                self.apply_action(ZapAction::SwitchTo(index), now).await
            }
            LiveCommand::Next => self.apply_action(ZapAction::Next, now).await,
            LiveCommand::Prev => self.apply_action(ZapAction::Prev, now).await,
            LiveCommand::Close => {
                self.close_session().await;
                self.publish().await;
            }
            LiveCommand::Key { key } => {
                if !self.session.is_visible() {
                    debug!("LiveCore: key {:?} ignored, overlay hidden", key);
                    return;
                }
                let action =
                    self.input
                        .on_key(key, self.session.channels().len(), &mut self.timers, now);
                self.apply_action(action, now).await;
            }
            LiveCommand::SelectQuality { level } => {
                self.quality.select_manual(&mut self.surface, level);
                self.publish().await;
            }
            LiveCommand::SetFullscreen { on } => {
                self.fullscreen = on;
                self.publish().await;
            }
        }
    }

    async fn apply_action(&mut self, action: ZapAction, now: Instant) {
        let changed = match action {
            ZapAction::None => false,
            ZapAction::SwitchTo(index) => self.session.switch_to(index),
            ZapAction::Next => self.session.next(),
            ZapAction::Prev => self.session.prev(),
            ZapAction::HistoryBack => self.session.history_back(),
            ZapAction::CommitNumber(number) => match self.session.index_of_number(number) {
                Some(index) => self.session.switch_to(index),
                None => {
                    info!("LiveCore: no channel numbered {}", number);
                    self.show_notice(
                        NoticeKind::ChannelNotFound,
                        "Channel not found",
                        now,
                        CHANNEL_NOT_FOUND_NOTICE,
                    );
                    false
                }
            },
            ZapAction::ToggleFavorite => {
                self.toggle_favorite(now);
                false
            }
            ZapAction::Exit => {
                if self.fullscreen {
                    self.fullscreen = false;
                    let _ = self.broadcast_tx.send(BroadcastMessage::ExitFullscreen);
                }
                self.close_session().await;
                false
            }
        };
        if changed {
            self.on_stream_changed(now).await;
        }
        self.publish().await;
    }

    fn toggle_favorite(&mut self, now: Instant) {
        let Some(channel) = self.session.zap().map(|z| z.channel.clone()) else {
            return;
        };
        let message = match self.favorites.toggle(&channel) {
            Ok(true) => "Added to favorites",
            Ok(false) => "Removed from favorites",
            Err(e) => {
                warn!("LiveCore: favorite toggle failed: {}", e);
                return;
            }
        };
        self.show_notice(NoticeKind::Favorite, message, now, FAVORITE_NOTICE);
    }

    // ── stream lifecycle ──────────────────────────────────────────────────────

    /// The session's URL changed: drop everything tied to the old stream
    /// before arming the new stream's quality tick.
    async fn on_stream_changed(&mut self, now: Instant) {
        self.timers.cancel(TimerKind::QualityTick);
        self.timers.cancel(TimerKind::PlaybackRetry);
        self.quality.reset(now);
        self.surface.reset();
        self.retry_attempt = 0;
        self.notices.dismiss(NoticeKind::StreamUnavailable);
        self.stop_external().await;

        let url = self.session.url().map(str::to_string);
        self.playback_status = if url.is_some() {
            self.timers
                .schedule(TimerKind::QualityTick, now, self.settings.quality_tick);
            PlaybackStatus::Connecting
        } else {
            PlaybackStatus::Idle
        };
        let _ = self.broadcast_tx.send(BroadcastMessage::StreamChanged {
            url,
            generation: self.session.generation(),
        });
    }

    /// Hide the session and tear down everything it was running.
    async fn close_session(&mut self) {
        self.session.close();
        self.input.reset(&mut self.timers);
        self.timers.cancel_all();
        self.abort_epg_tasks();
        self.quality.reset(Instant::now());
        self.surface.reset();
        self.retry_attempt = 0;
        self.playback_status = PlaybackStatus::Idle;
        self.notices.clear();
        self.stop_external().await;
        let _ = self.broadcast_tx.send(BroadcastMessage::StreamChanged {
            url: None,
            generation: self.session.generation(),
        });
    }

    async fn stop_external(&mut self) {
        if !self.player.is_active() && self.handoff_generation.is_none() {
            return;
        }
        self.handoff_generation = None;
        if let Err(e) = self.player.stop().await {
            warn!("LiveCore: external player stop failed: {}", e);
        }
    }

    async fn handle_surface_event(&mut self, event: SurfaceEvent, now: Instant) {
        match event {
            SurfaceEvent::Stall => {
                debug!("LiveCore: stall on generation {}", self.session.generation());
                self.quality.on_stall(now);
            }
            SurfaceEvent::Playing => {
                self.timers.cancel(TimerKind::PlaybackRetry);
                self.retry_attempt = 0;
                let cleared = self.notices.dismiss(NoticeKind::StreamUnavailable);
                if self.playback_status != PlaybackStatus::Playing || cleared {
                    self.playback_status = PlaybackStatus::Playing;
                    self.publish().await;
                }
            }
            SurfaceEvent::Fatal => {
                if self.retry_attempt < self.settings.max_retries {
                    self.retry_attempt += 1;
                    warn!(
                        "LiveCore: playback error, retry {}/{}",
                        self.retry_attempt, self.settings.max_retries
                    );
                    self.playback_status = PlaybackStatus::Retrying {
                        attempt: self.retry_attempt,
                    };
                    self.timers
                        .schedule(TimerKind::PlaybackRetry, now, self.settings.retry_delay);
                } else {
                    self.give_up().await;
                }
                self.publish().await;
            }
        }
    }

    /// Retries exhausted: persistent "stream unavailable", then optionally
    /// hand the URL to the external player.
    async fn give_up(&mut self) {
        warn!("LiveCore: stream unavailable after {} retries", self.retry_attempt);
        self.timers.cancel(TimerKind::QualityTick);
        self.playback_status = PlaybackStatus::Unavailable;
        self.notices
            .show_persistent(NoticeKind::StreamUnavailable, "Stream unavailable");
        let _ = self.broadcast_tx.send(BroadcastMessage::Notice(NoticeView {
            kind: NoticeKind::StreamUnavailable,
            message: "Stream unavailable".to_string(),
        }));

        if !self.settings.fallback_on_failure {
            return;
        }
        let Some(url) = self.session.url().map(str::to_string) else {
            return;
        };
        let title = self.session.title().to_string();
        match self.player.play(&url, &title).await {
            Ok(generation) => self.handoff_generation = Some(generation),
            Err(e) => warn!("LiveCore: external handoff failed: {}", e),
        }
    }

    // ── timers ────────────────────────────────────────────────────────────────

    /// Handle every timer and notice that is due at `now`.
    pub async fn fire_due(&mut self, now: Instant) {
        let mut dirty = self.notices.tick(now);

        for kind in self.timers.poll_expired(now) {
            match kind {
                TimerKind::NumericCommit | TimerKind::SelectHold => {
                    let action = self.input.on_timer(kind, self.session.index());
                    self.apply_action(action, now).await;
                }
                TimerKind::QualityTick => {
                    dirty |= self.quality_tick(now);
                    self.timers
                        .schedule(TimerKind::QualityTick, now, self.settings.quality_tick);
                }
                TimerKind::EpgRefresh => {
                    self.spawn_epg(true);
                    self.timers
                        .schedule(TimerKind::EpgRefresh, now, self.settings.epg_refresh);
                }
                TimerKind::PlaybackRetry => {
                    if self.session.reload() {
                        info!("LiveCore: reloading stream (attempt {})", self.retry_attempt);
                        let _ = self.broadcast_tx.send(BroadcastMessage::StreamChanged {
                            url: self.session.url().map(str::to_string),
                            generation: self.session.generation(),
                        });
                        dirty = true;
                    }
                }
            }
        }

        if dirty {
            self.publish().await;
        }
    }

    fn quality_tick(&mut self, now: Instant) -> bool {
        match self.quality.tick(&mut self.surface, now) {
            QualityDecision::Hold => false,
            QualityDecision::StepDown { notify, .. } => {
                if notify {
                    let duration = self.settings.quality_notice;
                    self.show_notice(
                        NoticeKind::QualityOptimized,
                        "Quality optimized for your connection",
                        now,
                        duration,
                    );
                }
                true
            }
            QualityDecision::StepUp { .. } => true,
        }
    }

    // ── EPG ───────────────────────────────────────────────────────────────────

    fn start_epg(&mut self, now: Instant) {
        self.spawn_epg(false);
        if !self.timers.is_pending(TimerKind::EpgRefresh) {
            self.timers
                .schedule(TimerKind::EpgRefresh, now, self.settings.epg_refresh);
        }
    }

    fn spawn_epg(&mut self, refresh: bool) {
        self.epg_tasks.retain(|h| !h.is_finished());
        let cache = Arc::clone(&self.epg);
        let channels = self.session.channels().to_vec();
        let handle = tokio::spawn(async move {
            if refresh {
                cache.refresh(&channels).await;
            } else {
                cache.preload(&channels).await;
            }
        });
        self.epg_tasks.push(handle.abort_handle());
    }

    fn abort_epg_tasks(&mut self) {
        for handle in self.epg_tasks.drain(..) {
            handle.abort();
        }
    }

    // ── output ────────────────────────────────────────────────────────────────

    fn show_notice(&mut self, kind: NoticeKind, message: &str, now: Instant, duration: Duration) {
        self.notices.show(kind, message, now, duration);
        let _ = self.broadcast_tx.send(BroadcastMessage::Notice(NoticeView {
            kind,
            message: message.to_string(),
        }));
    }

    fn build_snapshot(&self) -> LiveSnapshot {
        LiveSnapshot {
            rev: self.rev,
            generation: self.session.generation(),
            visible: self.session.is_visible(),
            channels: self.session.channels().to_vec(),
            index: self.session.index(),
            url: self.session.url().map(str::to_string),
            title: self.session.title().to_string(),
            zap: self.session.zap().cloned(),
            playback_status: self.playback_status.clone(),
            quality_level: self.surface.current_level(),
            manual_quality: self.quality.is_manual(),
            fullscreen: self.fullscreen,
            controls_visible: self.input.controls_visible(),
            numeric_entry: self.input.numeric_entry().to_string(),
            list_highlight: self.input.list_highlight(),
            notices: self.notices.views(),
        }
    }

    async fn publish(&mut self) {
        self.rev += 1;
        let snapshot = self.build_snapshot();
        *self.snapshot.write().await = snapshot;
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }

    async fn teardown(&mut self) {
        self.timers.cancel_all();
        self.abort_epg_tasks();
        self.stop_external().await;
        info!("LiveCore: stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epg::{EpgRecord, EpgSource};
    use crate::error::{LiveError, LiveResult};
    use crate::favorites::MemoryFavorites;
    use async_trait::async_trait;
    use iptv_proto::protocol::{BufferedRange, Category, QualityLevel, RemoteKey};
    use std::sync::Mutex;

    struct NoEpg;

    #[async_trait]
    impl EpgSource for NoEpg {
        async fn fetch_now_next(
            &self,
            _credentials: &Credentials,
            channel: u32,
        ) -> LiveResult<EpgRecord> {
            Err(LiveError::EpgStatus {
                channel,
                status: 404,
            })
        }
    }

    #[derive(Clone, Default)]
    struct PlayerLog(Arc<Mutex<Vec<String>>>);

    impl PlayerLog {
        fn calls(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct FakePlayer {
        log: PlayerLog,
        generation: u64,
        active: bool,
    }

    #[async_trait]
    impl ExternalPlayer for FakePlayer {
        async fn play(&mut self, url: &str, _title: &str) -> LiveResult<u64> {
            self.stop().await?;
            self.generation += 1;
            self.active = true;
            self.log.0.lock().unwrap().push(format!("play {}", url));
            Ok(self.generation)
        }
        async fn stop(&mut self) -> LiveResult<()> {
            if self.active {
                self.active = false;
                self.log.0.lock().unwrap().push("stop".into());
            }
            Ok(())
        }
        fn is_active(&self) -> bool {
            self.active
        }
    }

    fn catalog() -> Catalog {
        let categories = vec![Category {
            id: "n".into(),
            name: "News".into(),
        }];
        let channels = (1..=5)
            .map(|id| Channel {
                id,
                name: format!("News {}", id),
                category_id: Some("n".into()),
                ..Channel::default()
            })
            .collect();
        Catalog {
            categories,
            channels,
        }
    }

    fn core_with(
        settings: CoreSettings,
    ) -> (LiveCore, PlayerLog, broadcast::Receiver<BroadcastMessage>) {
        let creds = Credentials::new("panel.tv", "u", "p");
        let epg = Arc::new(EpgCache::new(Arc::new(NoEpg), creds.clone()));
        let log = PlayerLog::default();
        let player = FakePlayer {
            log: log.clone(),
            generation: 0,
            active: false,
        };
        let (tx, rx) = broadcast::channel(256);
        let core = LiveCore::new(
            settings,
            catalog(),
            creds,
            epg,
            Box::new(MemoryFavorites::new()),
            Box::new(player),
            tx,
        );
        (core, log, rx)
    }

    fn core() -> LiveCore {
        core_with(CoreSettings::default()).0
    }

    fn cmd(c: LiveCommand) -> LiveEvent {
        LiveEvent::Command(c)
    }

    fn key(k: RemoteKey) -> LiveEvent {
        cmd(LiveCommand::Key { key: k })
    }

    fn surface(event: SurfaceEvent) -> LiveEvent {
        LiveEvent::Surface {
            event,
            generation: None,
        }
    }

    #[tokio::test]
    async fn test_catalog_is_numbered_on_load() {
        let core = core();
        let numbers: Vec<Option<u32>> = core.catalog().iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![Some(101), Some(102), Some(103), Some(104), Some(105)]);
    }

    #[tokio::test]
    async fn test_open_next_wraps() {
        let mut core = core();
        let t0 = Instant::now();
        core.handle_event(cmd(LiveCommand::Open { index: 2 }), t0).await;
        core.handle_event(cmd(LiveCommand::Next), t0).await;
        assert_eq!(core.session().index(), 3);
        core.handle_event(cmd(LiveCommand::Next), t0).await;
        core.handle_event(cmd(LiveCommand::Next), t0).await;
        assert_eq!(core.session().index(), 0);
        assert_eq!(*core.playback_status(), PlaybackStatus::Connecting);
        assert!(core.timers().is_pending(TimerKind::QualityTick));

        let snap = core.snapshot();
        let snap = snap.read().await;
        assert!(snap.visible);
        assert_eq!(snap.url.as_deref(), Some("http://panel.tv/live/u/p/1.m3u8"));
    }

    #[tokio::test]
    async fn test_numeric_zap_hits_channel() {
        let mut core = core();
        let t0 = Instant::now();
        core.handle_event(cmd(LiveCommand::Open { index: 0 }), t0).await;
        core.handle_event(key(RemoteKey::Digit(1)), t0).await;
        core.handle_event(key(RemoteKey::Digit(0)), t0).await;
        core.handle_event(key(RemoteKey::Digit(4)), t0).await;
        core.fire_due(t0 + Duration::from_millis(1999)).await;
        assert_eq!(core.session().index(), 0);
        core.fire_due(t0 + Duration::from_secs(2)).await;
        assert_eq!(core.session().index(), 3);
        assert_eq!(core.input().numeric_entry(), "");
    }

    #[tokio::test]
    async fn test_numeric_zap_miss_shows_notice() {
        let mut core = core();
        let t0 = Instant::now();
        core.handle_event(cmd(LiveCommand::Open { index: 1 }), t0).await;
        core.handle_event(key(RemoteKey::Digit(7)), t0).await;
        core.fire_due(t0 + Duration::from_secs(2)).await;
        assert_eq!(core.session().index(), 1);
        assert_eq!(core.input().numeric_entry(), "");
        assert!(core.notices().is_showing(NoticeKind::ChannelNotFound));
        core.fire_due(t0 + Duration::from_millis(3900)).await;
        assert!(!core.notices().is_showing(NoticeKind::ChannelNotFound));
    }

    #[tokio::test]
    async fn test_three_stalls_step_down_once_with_notice() {
        let mut core = core();
        let t0 = Instant::now();
        core.handle_event(cmd(LiveCommand::Open { index: 0 }), t0).await;
        core.handle_event(
            LiveEvent::Telemetry(SurfaceTelemetry {
                level_count: 3,
                playhead: 0.0,
                buffered: vec![BufferedRange {
                    start: 0.0,
                    end: 10.0,
                }],
                ..SurfaceTelemetry::default()
            }),
            t0,
        )
        .await;
        core.surface.select_level(QualityLevel::Level(2));

        for ms in [100, 200, 300] {
            core.handle_event(surface(SurfaceEvent::Stall), t0 + Duration::from_millis(ms))
                .await;
        }
        core.fire_due(t0 + Duration::from_millis(1500)).await;
        assert_eq!(core.surface().current_level(), QualityLevel::Level(1));
        assert!(core.notices().is_showing(NoticeKind::QualityOptimized));

        // stall history was consumed by the step-down
        core.fire_due(t0 + Duration::from_millis(3000)).await;
        assert_eq!(core.surface().current_level(), QualityLevel::Level(1));
    }

    #[tokio::test]
    async fn test_switch_resets_quality_and_drops_stale_events() {
        let mut core = core();
        let t0 = Instant::now();
        core.handle_event(cmd(LiveCommand::Open { index: 0 }), t0).await;
        let old_generation = core.session().generation();
        core.handle_event(cmd(LiveCommand::SelectQuality { level: QualityLevel::Level(0) }), t0)
            .await;
        assert!(core.quality().is_manual());

        core.handle_event(cmd(LiveCommand::Next), t0).await;
        assert!(!core.quality().is_manual());
        assert_eq!(core.surface().current_level(), QualityLevel::Auto);

        for s in 0..5 {
            core.handle_event(
                LiveEvent::Surface {
                    event: SurfaceEvent::Stall,
                    generation: Some(old_generation),
                },
                t0 + Duration::from_millis(s * 100),
            )
            .await;
        }
        assert_eq!(core.quality().recent_stalls(t0 + Duration::from_secs(1)), 0);
    }

    #[tokio::test]
    async fn test_fatal_retries_then_unavailable_then_handoff() {
        let settings = CoreSettings {
            fallback_on_failure: true,
            ..CoreSettings::default()
        };
        let (mut core, log, mut rx) = core_with(settings);
        let t0 = Instant::now();
        core.handle_event(cmd(LiveCommand::Open { index: 0 }), t0).await;

        let mut now = t0;
        for attempt in 1..=3 {
            core.handle_event(surface(SurfaceEvent::Fatal), now).await;
            assert_eq!(*core.playback_status(), PlaybackStatus::Retrying { attempt });
            now += Duration::from_secs(2);
            core.fire_due(now).await;
        }
        core.handle_event(surface(SurfaceEvent::Fatal), now).await;
        assert_eq!(*core.playback_status(), PlaybackStatus::Unavailable);
        assert!(core.notices().is_showing(NoticeKind::StreamUnavailable));
        assert_eq!(log.calls(), vec!["play http://panel.tv/live/u/p/1.m3u8"]);

        // a later zap stops the external player before anything else
        core.handle_event(cmd(LiveCommand::Next), now).await;
        assert_eq!(log.calls().last().map(String::as_str), Some("stop"));
        assert!(!core.notices().is_showing(NoticeKind::StreamUnavailable));

        let mut saw_stream_changed = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, BroadcastMessage::StreamChanged { .. }) {
                saw_stream_changed = true;
            }
        }
        assert!(saw_stream_changed);
    }

    #[tokio::test]
    async fn test_playing_resets_retries() {
        let mut core = core();
        let t0 = Instant::now();
        core.handle_event(cmd(LiveCommand::Open { index: 0 }), t0).await;
        core.handle_event(surface(SurfaceEvent::Fatal), t0).await;
        core.handle_event(surface(SurfaceEvent::Playing), t0).await;
        assert_eq!(*core.playback_status(), PlaybackStatus::Playing);
        assert!(!core.timers().is_pending(TimerKind::PlaybackRetry));
    }

    #[tokio::test]
    async fn test_history_back_and_favorite_keys() {
        let mut core = core();
        let t0 = Instant::now();
        core.handle_event(cmd(LiveCommand::Open { index: 0 }), t0).await;
        core.handle_event(cmd(LiveCommand::SwitchTo { index: 4 }), t0).await;
        core.handle_event(key(RemoteKey::Erase), t0).await;
        assert_eq!(core.session().index(), 0);

        core.handle_event(key(RemoteKey::Favorite), t0).await;
        assert_eq!(core.notices().message(NoticeKind::Favorite), Some("Added to favorites"));
        core.handle_event(key(RemoteKey::Favorite), t0).await;
        assert_eq!(
            core.notices().message(NoticeKind::Favorite),
            Some("Removed from favorites")
        );
    }

    #[tokio::test]
    async fn test_escape_exits_fullscreen_and_closes() {
        let (mut core, _log, mut rx) = core_with(CoreSettings::default());
        let t0 = Instant::now();
        core.handle_event(cmd(LiveCommand::Open { index: 3 }), t0).await;
        core.handle_event(cmd(LiveCommand::SetFullscreen { on: true }), t0).await;
        core.handle_event(key(RemoteKey::Escape), t0).await;

        assert!(!core.session().is_visible());
        assert_eq!(core.session().index(), 3);
        assert_eq!(core.next_deadline(), None);
        let mut exited = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, BroadcastMessage::ExitFullscreen) {
                exited = true;
            }
        }
        assert!(exited);

        // keys are ignored while hidden
        core.handle_event(key(RemoteKey::Down), t0).await;
        assert_eq!(core.session().index(), 3);
    }

    #[tokio::test]
    async fn test_long_press_list_commit() {
        let mut core = core();
        let t0 = Instant::now();
        core.handle_event(cmd(LiveCommand::Open { index: 1 }), t0).await;
        core.handle_event(key(RemoteKey::SelectPressed), t0).await;
        core.fire_due(t0 + Duration::from_millis(600)).await;
        assert_eq!(core.input().list_highlight(), Some(1));
        core.handle_event(key(RemoteKey::SelectReleased), t0).await;
        core.handle_event(key(RemoteKey::Down), t0).await;
        core.handle_event(key(RemoteKey::Down), t0).await;
        // list movement does not zap
        assert_eq!(core.session().index(), 1);
        core.handle_event(key(RemoteKey::SelectPressed), t0).await;
        assert_eq!(core.session().index(), 3);
        assert_eq!(core.input().list_highlight(), None);
    }

    #[tokio::test]
    async fn test_external_end_reports_only_current_handoff() {
        let (mut core, _log, mut rx) = core_with(CoreSettings::default());
        core.handoff_generation = Some(2);
        core.handle_event(LiveEvent::ExternalEnded { generation: 1 }, Instant::now())
            .await;
        core.handle_event(LiveEvent::ExternalEnded { generation: 2 }, Instant::now())
            .await;
        let ended = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|m| matches!(m, BroadcastMessage::PlaybackEnded))
            .count();
        assert_eq!(ended, 1);
    }
}

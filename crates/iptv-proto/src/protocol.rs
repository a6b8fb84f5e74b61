use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Panel-side stream identifier of a live channel.
pub type ChannelId = u32;

/// A live channel as handed over by the catalog.  Everything except `number`
/// is read-only for the live engine; `number` is the session display number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    /// Display number, (re)assigned per session by the bucket numbering.
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// Panel login used to build stream and EPG URLs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Credentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            username: username.into(),
            password: password.into(),
        }
    }

    /// True when base URL, username and password are all present.
    pub fn is_complete(&self) -> bool {
        !self.base_url.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Prepend `http://` when no scheme is given and strip trailing slashes.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// Adaptive-stream rendition.  `Auto` lets the stream client pick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum QualityLevel {
    #[default]
    Auto,
    Level(usize),
}

impl QualityLevel {
    /// Ordinal form used by stream clients: -1 for automatic.
    pub fn ordinal(self) -> i64 {
        match self {
            QualityLevel::Auto => -1,
            QualityLevel::Level(n) => n as i64,
        }
    }

    pub fn from_ordinal(ordinal: i64) -> Self {
        if ordinal < 0 {
            QualityLevel::Auto
        } else {
            QualityLevel::Level(ordinal as usize)
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityLevel::Auto => write!(f, "auto"),
            QualityLevel::Level(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for QualityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(QualityLevel::Auto);
        }
        let ordinal: i64 = s
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid quality level '{}'", s))?;
        Ok(QualityLevel::from_ordinal(ordinal))
    }
}

/// Playback status of the inline surface as tracked by the live engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle, // nothing open
    Connecting,                 // URL handed to the surface, no frames yet
    Playing,                    // surface reported playback
    Retrying { attempt: u32 },  // fatal error, reload scheduled
    Unavailable,                // retries exhausted: "stream unavailable"
}

/// Remote-control keys understood by the zap overlay.
///
/// `Select` is split into press and release so the overlay can tell a short
/// press (toggle controls) from a hold (open the channel list).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RemoteKey {
    Digit(u8),
    Erase,
    Escape,
    Up,
    Down,
    SelectPressed,
    SelectReleased,
    Favorite,
}

impl FromStr for RemoteKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        if key.len() == 1 {
            if let Some(d) = key.chars().next().and_then(|c| c.to_digit(10)) {
                return Ok(RemoteKey::Digit(d as u8));
            }
        }
        match key.as_str() {
            "erase" | "backspace" => Ok(RemoteKey::Erase),
            "escape" | "esc" | "back" => Ok(RemoteKey::Escape),
            "up" => Ok(RemoteKey::Up),
            "down" => Ok(RemoteKey::Down),
            "select" | "ok" | "enter" => Ok(RemoteKey::SelectPressed),
            "select-up" | "ok-up" | "enter-up" => Ok(RemoteKey::SelectReleased),
            "favorite" | "fav" | "f" => Ok(RemoteKey::Favorite),
            other => anyhow::bail!("unknown remote key '{}'", other),
        }
    }
}

/// Commands sent to the live engine by clients (HTTP API, embedding UI).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum LiveCommand {
    Open { index: usize },
    SwitchTo { index: usize },
    Next,
    Prev,
    Close,
    Key { key: RemoteKey },
    SelectQuality { level: QualityLevel },
    SetFullscreen { on: bool },
}

/// Transient notices shown on the overlay.  One active notice per kind.
/// Declaration order is display order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoticeKind {
    StreamUnavailable,
    ChannelNotFound,
    QualityOptimized,
    Favorite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoticeView {
    pub kind: NoticeKind,
    pub message: String,
}

/// The most recent zap: which channel and when (unix millis).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZapInfo {
    pub channel: Channel,
    pub at_epoch_ms: i64,
}

/// A `[start, end]` span of buffered media, in stream seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BufferedRange {
    pub start: f64,
    pub end: f64,
}

/// Playback telemetry pushed by the surface that renders the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SurfaceTelemetry {
    /// Stream generation the telemetry belongs to; omitted means current.
    #[serde(default)]
    pub generation: Option<u64>,
    #[serde(default)]
    pub level_count: usize,
    #[serde(default)]
    pub playhead: f64,
    #[serde(default)]
    pub buffered: Vec<BufferedRange>,
    #[serde(default)]
    pub dropped_frames: u64,
    #[serde(default)]
    pub total_frames: u64,
}

/// Discrete playback events reported by the surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceEvent {
    /// Buffer ran dry (`waiting` / `stalled`).
    Stall,
    Playing,
    /// Unrecoverable error on the current URL.
    Fatal,
}

impl FromStr for SurfaceEvent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stall" | "waiting" | "stalled" => Ok(SurfaceEvent::Stall),
            "playing" => Ok(SurfaceEvent::Playing),
            "fatal" | "error" => Ok(SurfaceEvent::Fatal),
            other => anyhow::bail!("unknown surface event '{}'", other),
        }
    }
}

/// Read-only view of the engine published to clients.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LiveSnapshot {
    /// Monotonic revision counter, bumped on every published change.
    #[serde(default)]
    pub rev: u64,
    /// Bumped whenever the stream URL is (re)loaded; surfaces echo it back.
    #[serde(default)]
    pub generation: u64,
    pub visible: bool,
    pub channels: Vec<Channel>,
    pub index: usize,
    pub url: Option<String>,
    pub title: String,
    pub zap: Option<ZapInfo>,
    pub playback_status: PlaybackStatus,
    pub quality_level: QualityLevel,
    pub manual_quality: bool,
    pub fullscreen: bool,
    pub controls_visible: bool,
    pub numeric_entry: String,
    /// Highlighted row while the channel list is open.
    pub list_highlight: Option<usize>,
    pub notices: Vec<NoticeView>,
}

//! Errors produced inside the live engine.
//!
//! None of these cross a component boundary as a hard failure: the core logs
//! them and carries on (an EPG miss leaves a record unset, a favorites or
//! player failure never blocks a switch).

use thiserror::Error;

use iptv_proto::protocol::ChannelId;

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("EPG request for channel {channel} failed: {source}")]
    EpgHttp {
        channel: ChannelId,
        #[source]
        source: reqwest::Error,
    },

    #[error("EPG request for channel {channel} returned HTTP {status}")]
    EpgStatus { channel: ChannelId, status: u16 },

    #[error("EPG payload for channel {channel} could not be decoded: {reason}")]
    EpgDecode { channel: ChannelId, reason: String },

    #[error("invalid panel URL {0}")]
    InvalidUrl(String),

    #[error("panel credentials are incomplete")]
    MissingCredentials,

    #[error("favorites store error: {0}")]
    Favorites(String),

    #[error("external player error: {0}")]
    ExternalPlayer(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type LiveResult<T> = Result<T, LiveError>;

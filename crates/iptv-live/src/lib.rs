//! Live-channel playback engine: zapping, numeric entry, EPG prefetch,
//! adaptive quality and external-player handoff behind one event loop.

pub mod core;
pub mod epg;
pub mod error;
pub mod favorites;
pub mod handoff;
pub mod http;
pub mod notice;
pub mod numbering;
pub mod quality;
pub mod scheduler;
pub mod session;
pub mod surface;
pub mod zap_history;
pub mod zap_input;

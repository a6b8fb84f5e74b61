//! Types and configuration shared by the live engine and its clients.

pub mod catalog;
pub mod config;
pub mod platform;
pub mod protocol;

//! nliten — Enphase Enlighten system health on a blink(1) status light.

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod led;
pub mod monitor;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod shutdown;
pub mod time;

pub use error::NlitenError;

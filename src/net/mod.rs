//! Network side of the live source: discovery, connection, and keep-alive.

pub mod client;
pub mod config;
pub mod discovery;

pub use client::{FIRE_INTERVAL, RECONNECT_DELAY, SonarClient, SonarConnection};
pub use config::SonarConfiguration;
pub use discovery::{DISCOVERY_TIMEOUT, discover};

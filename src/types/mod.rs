//! Core types shared by the sources, the pipeline and the session controller.
//!
//! - [`Ping`] is one decoded sonar return, valid or not, always carrying its raw bytes
//! - [`PingGeometry`] is the bearing/range/intensity grid of a valid ping
//! - [`PingRate`] is the ping-rate policy a live source configures on the sonar
//! - [`SonarAddress`] selects an explicit endpoint or auto-discovery
//! - [`FrameLimit`] is the optional frame-count stop condition
//!
//! ```rust
//! use sonarlink::Ping;
//! use sonarlink::protocol::SimplePingBuilder;
//!
//! let ping = Ping::decode(SimplePingBuilder::new().ping_id(7).build());
//! assert!(ping.valid());
//! assert_eq!(ping.geometry().unwrap().ping_id, 7);
//! ```

mod address;
mod frame_limit;
mod ping;
mod ping_rate;

pub use address::SonarAddress;
pub use frame_limit::FrameLimit;
pub use ping::{InvalidPing, Ping, PingGeometry};
pub use ping_rate::PingRate;

//! Sonar wire protocol: message layout, framing, and message construction.
//!
//! This module is the decoder boundary of the crate. The network client and the
//! capture reader both hand complete messages to [`Ping::decode`](crate::Ping::decode).

pub mod builder;
pub mod codec;
pub mod format;

pub use builder::{SimplePingBuilder, build_message};
pub use codec::MessageCodec;
pub use format::{MessageHeader, MessageId, SimpleFire, StatusMessage};

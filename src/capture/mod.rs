//! Raw capture files: the sink that records valid pings and the reader that replays them.

pub mod reader;
pub mod sink;

pub use reader::CaptureReader;
pub use sink::CaptureSink;

pub mod catalog;
pub mod config;
pub mod params;
pub mod rtsp;

pub use config::WfdSettings;
pub use rtsp::{CodecError, Headers, Message, StartLine};

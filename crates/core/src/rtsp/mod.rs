//! RTSP/1.0 client side (RFC 2326): session state machine, request
//! framing, and the RTP media receiver it drives while playing.

pub mod client;
pub mod url;

pub use client::{RtspClient, SessionState, VideoParameters};
pub use url::StreamUrl;

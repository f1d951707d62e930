//! Wire-format parsing shared by the RTSP control side and the HTTP origin.
//!
//! - [`message`] — line-oriented framing common to both protocols
//!   (start line, case-insensitive headers, `Content-Length` body).
//! - [`sdp`] — RFC 4566 session descriptions carried by DESCRIBE responses.

pub mod message;
pub mod sdp;

pub use message::Headers;
pub use sdp::{MediaDescription, SessionDescription, TimeDescription};

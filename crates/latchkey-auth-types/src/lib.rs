//! Request-facing auth types shared by Latchkey HTTP handlers.
//!
//! Provides the session and remember-me cookie builders and the `ClientOrigin`
//! extractor.

pub mod cookie;
pub mod origin;

//! Lounge runtime: the generator thread and the handle used to drive it.
//!
//! The runtime manages:
//! - The backing loop and the auto-play timer
//! - Pending manual and automatic note requests
//! - Note computation, inline or on a worker thread
//! - Message passing between the control surface and the playback service

pub mod thread;

pub use thread::{Generator, GeneratorHandle};

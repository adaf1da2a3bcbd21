//! # lavamedia
//!
//! Audio container handling for the Spotilava gateway:
//!
//! - [`classify`] recognises the container from the first bytes of a stream.
//! - [`inject`] rewrites the header window of an Ogg/Vorbis, MP3 or FLAC
//!   stream so that title, artists, album and duration travel with the audio.
//! - [`inject_buffered`] does the same for a complete MP4/M4A file.
//!
//! Everything here is synchronous and works on byte slices; the streaming
//! side lives in the gateway crates.

pub mod error;
pub mod format;
pub mod inject;
pub mod sniff;

mod flac;
mod id3;
mod mp4;
mod ogg;
mod vorbis_comment;

pub use error::InjectError;
pub use format::AudioFormat;
pub use inject::{inject, inject_buffered, Injected, TrackTags, MAX_HEADER_WINDOW};
pub use sniff::classify;

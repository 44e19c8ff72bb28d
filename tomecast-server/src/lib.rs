//! # Tomecast Server
//!
//! Adaptive audio delivery for a self-hosted audiobook library.
//!
//! - **Negotiation**: play the original file when the client can decode it,
//!   otherwise pick a stereo or spatial AAC rendition
//! - **Transcoding**: deduplicated, prioritized ffmpeg jobs on a bounded
//!   worker pool, cached on disk as HLS
//! - **Streaming**: RFC 7233 byte ranges for originals and contained file
//!   serving for HLS output

pub mod auth;
pub mod infra;
pub mod playback;
pub mod routes;
pub mod stream;
pub mod transcoding;

pub use infra::app_state::AppState;

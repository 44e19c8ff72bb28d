//! # Tomecast Core
//!
//! Core library for the Tomecast audiobook server, providing the domain
//! types shared by the streaming engine and the HTTP layer.
//!
//! ## Overview
//!
//! - **Audio sources**: immutable descriptions of playable files as the
//!   library catalog knows them
//! - **Codec handling**: alias normalization and the multichannel codec set
//! - **Negotiation**: the pure decision between serving the original file
//!   and producing a transcoded variant
//! - **Transcode jobs**: job records, status enum and variant keys used by
//!   the job engine
//! - **Catalog**: the trait boundary to the library catalog, with an
//!   in-memory implementation backed by a JSON manifest
//!
//! ## Examples
//!
//! ```
//! use tomecast_core::{ClientCapabilities, TranscodeVariant, negotiate::decide};
//!
//! let caps = ClientCapabilities::new(["aac"], false);
//! let decision = decide("ac4", &caps.codecs, caps.prefer_spatial, true);
//! assert!(!decision.play_original);
//! assert_eq!(decision.variant, TranscodeVariant::Stereo);
//! ```

pub mod audio;
pub mod catalog;
pub mod codec;
pub mod error;
pub mod negotiate;
pub mod transcode;

pub use audio::{AudioSource, ClientCapabilities};
pub use catalog::{AudioCatalog, JsonCatalog};
pub use error::{MediaError, Result};
pub use negotiate::Decision;
pub use transcode::{JobKey, JobStatus, TranscodeJob, TranscodeVariant};

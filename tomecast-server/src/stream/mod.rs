//! Byte serving: range requests on original audio and HLS artifacts of
//! completed transcodes.

pub mod handlers;
pub mod hls;
pub mod range;

pub use range::{ByteRange, RangeError, parse_range_header};

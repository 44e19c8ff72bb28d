//! Codec name normalization.
//!
//! Clients and the catalog describe codecs loosely (`m4b`, `AC-3`,
//! `E-AC-3`, `mp4a`). Everything that compares codecs goes through
//! [`normalize`] first so the comparison is an exact match on canonical
//! lowercase names.

/// Codecs that can carry more than two channels and are therefore eligible
/// for the spatial variant.
pub const MULTICHANNEL_CODECS: &[&str] = &["ac3", "eac3", "ac4", "truehd", "dts"];

/// Codec every transcoded variant is encoded to.
pub const TRANSCODED_CODEC: &str = "aac";

/// Canonical lowercase codec name for a raw codec or container identifier.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "m4a" | "m4b" | "mp4" | "mp4a" | "aac_lc" | "aac-lc" | "he-aac" | "he_aac" => "aac",
        "ac-3" | "a52" => "ac3",
        "e-ac-3" | "ec-3" | "ec3" => "eac3",
        "ac-4" => "ac4",
        "mpeg" | "mp3float" | "mpga" => "mp3",
        "dca" => "dts",
        "mlp" => "truehd",
        "oga" => "vorbis",
        other => return other.to_string(),
    }
    .to_string()
}

/// Whether the (already normalized or raw) codec belongs to the
/// multichannel-capable set.
pub fn is_multichannel_capable(codec: &str) -> bool {
    let normalized = normalize(codec);
    MULTICHANNEL_CODECS.contains(&normalized.as_str())
}

/// MIME type for an original audio file, chosen by container/extension.
pub fn audio_content_type(container: &str) -> &'static str {
    match container.trim().to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "m4b" | "mp4" | "aac" => "audio/mp4",
        "flac" => "audio/flac",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        "ac3" => "audio/ac3",
        "eac3" | "ec3" => "audio/eac3",
        "ac4" => "audio/ac4",
        _ => "application/octet-stream",
    }
}

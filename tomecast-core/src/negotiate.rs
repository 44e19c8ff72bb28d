//! Capability negotiation between a source file and a requesting client.

use std::collections::HashSet;

use serde::Serialize;
use tracing::trace;

use crate::codec;
use crate::transcode::TranscodeVariant;

/// Outcome of [`decide`].
///
/// `variant` is only meaningful when `play_original` is false; it is
/// `Stereo` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub play_original: bool,
    pub variant: TranscodeVariant,
}

impl Decision {
    pub const fn original() -> Self {
        Self {
            play_original: true,
            variant: TranscodeVariant::Stereo,
        }
    }

    pub const fn transcode(variant: TranscodeVariant) -> Self {
        Self {
            play_original: false,
            variant,
        }
    }
}

/// Decide whether the client can play `source_codec` as-is.
///
/// The capability set is expected to hold normalized names (as built by
/// [`crate::ClientCapabilities::new`]); raw names are tolerated because the
/// set is normalized again before lookup when an exact hit fails.
///
/// A file the client can decode is played as-is, except that a
/// multichannel-capable source is only handed over untouched to a client
/// that asked for spatial audio; a client that declined spatial gets the
/// stereo rendition. When transcoding, the spatial variant is chosen only
/// when the client prefers it and the source codec is multichannel-capable.
/// `source_is_multichannel` is informational: the codec set decides.
pub fn decide(
    source_codec: &str,
    capabilities: &HashSet<String>,
    prefer_spatial: bool,
    source_is_multichannel: bool,
) -> Decision {
    let source = codec::normalize(source_codec);

    let supported = capabilities.contains(&source)
        || capabilities.iter().any(|c| codec::normalize(c) == source);

    let spatial_codec = codec::is_multichannel_capable(&source);

    let decision = if supported && (prefer_spatial || !spatial_codec) {
        Decision::original()
    } else if prefer_spatial && spatial_codec {
        Decision::transcode(TranscodeVariant::Spatial)
    } else {
        Decision::transcode(TranscodeVariant::Stereo)
    };

    trace!(
        codec = %source,
        prefer_spatial,
        source_is_multichannel,
        play_original = decision.play_original,
        variant = %decision.variant,
        "negotiated playback"
    );

    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(codecs: &[&str]) -> HashSet<String> {
        codecs.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn aac_source_plays_original_for_aac_client() {
        for spatial in [false, true] {
            let decision = decide("aac", &caps(&["aac"]), spatial, false);
            assert_eq!(decision, Decision::original());
        }
    }

    #[test]
    fn ac4_client_with_ac4_plays_original_even_when_spatial() {
        let decision = decide("ac4", &caps(&["aac", "ac4"]), true, true);
        assert_eq!(decision, Decision::original());
    }

    #[test]
    fn ac4_spatial_without_ac4_support_transcodes_spatial() {
        let decision = decide("ac4", &caps(&["aac"]), true, true);
        assert_eq!(decision, Decision::transcode(TranscodeVariant::Spatial));
    }

    #[test]
    fn ac4_client_declining_spatial_gets_stereo() {
        let decision = decide("ac4", &caps(&["aac", "ac4"]), false, true);
        assert_eq!(decision, Decision::transcode(TranscodeVariant::Stereo));
    }

    #[test]
    fn ac4_without_spatial_preference_transcodes_stereo() {
        let decision = decide("ac4", &caps(&["aac"]), false, true);
        assert_eq!(decision, Decision::transcode(TranscodeVariant::Stereo));
    }

    #[test]
    fn spatial_preference_ignored_for_stereo_only_codecs() {
        let decision = decide("mp3", &caps(&["aac"]), true, false);
        assert_eq!(decision, Decision::transcode(TranscodeVariant::Stereo));
    }

    #[test]
    fn aliases_match_on_both_sides() {
        let decision = decide("M4B", &caps(&["mp4"]), false, false);
        assert!(decision.play_original);

        let decision = decide("E-AC-3", &caps(&["eac3"]), true, true);
        assert!(decision.play_original);

        let decision = decide("E-AC-3", &caps(&["ec-3"]), false, true);
        assert_eq!(decision, Decision::transcode(TranscodeVariant::Stereo));
    }

    #[test]
    fn empty_capabilities_always_transcode() {
        let decision = decide("eac3", &HashSet::new(), true, true);
        assert_eq!(decision, Decision::transcode(TranscodeVariant::Spatial));
    }
}

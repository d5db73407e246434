//! Demuxer error classification

use super::{DemuxerError, DemuxerErrorKind};
use serde::{Deserialize, Serialize};

/// Error taxonomy driving the recovery state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Manifest/fragment transport failure
    Network,
    /// Decoding pipeline failure
    Media,
    /// Media error caused by an unsupported or broken codec
    Codec,
    /// Fragment could not be demuxed
    FragmentParsing,
    /// Everything else; left to the demuxer
    Other,
}

impl ErrorClass {
    /// Codec errors are a media error subtype
    pub fn is_media(&self) -> bool {
        matches!(self, ErrorClass::Media | ErrorClass::Codec)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Network => write!(f, "network"),
            ErrorClass::Media => write!(f, "media"),
            ErrorClass::Codec => write!(f, "codec"),
            ErrorClass::FragmentParsing => write!(f, "fragment_parsing"),
            ErrorClass::Other => write!(f, "other"),
        }
    }
}

/// Map a raw demuxer error onto the recovery taxonomy.
///
/// Returns `None` for errors the engine leaves entirely to the demuxer:
/// non-fatal network and media errors are retried internally.
pub fn classify(error: &DemuxerError) -> Option<ErrorClass> {
    let details = error.details.to_ascii_lowercase();

    // Fragment parsing errors count whether or not the demuxer flags them fatal
    if details.contains("fragparsing") || details.contains("frag_parsing") {
        return Some(ErrorClass::FragmentParsing);
    }

    if !error.fatal {
        return None;
    }

    let class = match error.kind {
        DemuxerErrorKind::Network => ErrorClass::Network,
        DemuxerErrorKind::Media if details.contains("codec") => ErrorClass::Codec,
        DemuxerErrorKind::Media => ErrorClass::Media,
        DemuxerErrorKind::Mux => ErrorClass::FragmentParsing,
        DemuxerErrorKind::Other => ErrorClass::Other,
    };
    Some(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(kind: DemuxerErrorKind, details: &str, fatal: bool) -> DemuxerError {
        DemuxerError {
            kind,
            details: details.to_string(),
            fatal,
            fragment: None,
        }
    }

    #[test]
    fn test_classify_codec_errors() {
        let err = error(DemuxerErrorKind::Media, "bufferAddCodecError", true);
        assert_eq!(classify(&err), Some(ErrorClass::Codec));
        assert!(ErrorClass::Codec.is_media());
    }

    #[test]
    fn test_classify_fragment_parsing_non_fatal() {
        let err = error(DemuxerErrorKind::Media, "fragParsingError", false);
        assert_eq!(classify(&err), Some(ErrorClass::FragmentParsing));
    }

    #[test]
    fn test_non_fatal_left_to_demuxer() {
        let err = error(DemuxerErrorKind::Network, "fragLoadTimeOut", false);
        assert_eq!(classify(&err), None);

        let err = error(DemuxerErrorKind::Network, "manifestLoadError", true);
        assert_eq!(classify(&err), Some(ErrorClass::Network));
    }
}

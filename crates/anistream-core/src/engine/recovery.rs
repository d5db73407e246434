//! Error recovery state machine
//!
//! Pure decision logic: given a classified error, the level ladder and the
//! instance-scoped counters, decide what the engine should do next. The
//! engine applies the returned [`RecoveryAction`] to the demuxer.
//!
//! | Class            | Action                                             |
//! |------------------|----------------------------------------------------|
//! | Network          | restart loading (unbounded)                        |
//! | Media, 1-3       | recover, switching level first after codec errors  |
//! | Media, 4-5       | swap audio codec, then recover                     |
//! | Media, >5        | fatal `playerError`                                |
//! | Codec, >=4       | fatal `codecError`                                 |
//! | FragmentParsing  | level toggle every 3rd, fatal `codecError` at 15   |

use super::classify::ErrorClass;
use super::levels::{adjacent_level, alternate_level};
use crate::types::{ErrorCounters, FatalReason, QualityLevel};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Recovery bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryLimits {
    /// Media errors handled with a plain pipeline re-initialization
    pub media_recover_attempts: u32,
    /// Media errors handled at all (audio codec swap above the plain tier)
    pub media_max_attempts: u32,
    /// Codec errors that trigger a forced level switch
    pub codec_switch_threshold: u32,
    /// Codec errors that end the session
    pub codec_fatal_threshold: u32,
    /// Fragment parsing errors between level toggles
    pub frag_parsing_switch_every: u32,
    /// Cumulative fragment parsing errors that end the session
    pub frag_parsing_fatal_threshold: u32,
}

impl Default for RecoveryLimits {
    fn default() -> Self {
        Self {
            media_recover_attempts: 3,
            media_max_attempts: 5,
            codec_switch_threshold: 2,
            codec_fatal_threshold: 4,
            frag_parsing_switch_every: 3,
            frag_parsing_fatal_threshold: 15,
        }
    }
}

/// What the engine should do about an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryAction {
    /// Nothing to do
    Ignore,
    /// Reload manifest/fragments
    RestartLoad,
    /// Re-initialize the media pipeline
    RecoverMedia,
    /// Pin another level, then re-initialize the media pipeline
    SwitchLevelAndRecover(i32),
    /// Swap the audio codec path, then re-initialize the media pipeline
    SwapAudioCodecAndRecover,
    /// Pin another level and keep going
    SwitchLevel(i32),
    /// Give up; the engine is destroyed
    Fatal(FatalReason),
}

impl RecoveryAction {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecoveryAction::Fatal(_))
    }
}

/// Recovery state for one engine instance
#[derive(Debug, Clone, Default)]
pub struct RecoveryPolicy {
    limits: RecoveryLimits,
    counters: ErrorCounters,
}

impl RecoveryPolicy {
    pub fn new(limits: RecoveryLimits) -> Self {
        Self {
            limits,
            counters: ErrorCounters::default(),
        }
    }

    pub fn counters(&self) -> ErrorCounters {
        self.counters
    }

    pub fn limits(&self) -> &RecoveryLimits {
        &self.limits
    }

    /// Zero all counters
    pub fn reset(&mut self) {
        self.counters.reset();
    }

    /// Decide how to handle one classified error
    pub fn on_error(
        &mut self,
        class: ErrorClass,
        levels: &[QualityLevel],
        current_level: i32,
    ) -> RecoveryAction {
        let action = match class {
            ErrorClass::Network => RecoveryAction::RestartLoad,
            ErrorClass::Media | ErrorClass::Codec => {
                self.on_media_error(class == ErrorClass::Codec, levels, current_level)
            }
            ErrorClass::FragmentParsing => self.on_fragment_parsing_error(levels, current_level),
            ErrorClass::Other => RecoveryAction::Ignore,
        };

        debug!(
            class = %class,
            action = ?action,
            media = self.counters.media_error_count,
            codec = self.counters.codec_error_count,
            frag_parsing = self.counters.frag_parsing_error_count,
            frag_parsing_total = self.counters.frag_parsing_total,
            "Recovery decision"
        );

        action
    }

    fn on_media_error(
        &mut self,
        is_codec: bool,
        levels: &[QualityLevel],
        current_level: i32,
    ) -> RecoveryAction {
        let limits = &self.limits;
        let counters = &mut self.counters;

        counters.media_error_count += 1;
        if is_codec {
            counters.codec_error_count += 1;
        }

        if counters.codec_error_count >= limits.codec_fatal_threshold {
            warn!(codec_errors = counters.codec_error_count, "Codec error bound exceeded");
            return RecoveryAction::Fatal(FatalReason::CodecError);
        }

        if counters.media_error_count <= limits.media_recover_attempts {
            if counters.codec_error_count >= limits.codec_switch_threshold {
                if let Some(target) = alternate_level(levels, current_level) {
                    counters.codec_error_count = 0;
                    return RecoveryAction::SwitchLevelAndRecover(target);
                }
            }
            return RecoveryAction::RecoverMedia;
        }

        if counters.media_error_count <= limits.media_max_attempts {
            return RecoveryAction::SwapAudioCodecAndRecover;
        }

        warn!(media_errors = counters.media_error_count, "Media error bound exceeded");
        RecoveryAction::Fatal(FatalReason::PlayerError)
    }

    fn on_fragment_parsing_error(
        &mut self,
        levels: &[QualityLevel],
        current_level: i32,
    ) -> RecoveryAction {
        let limits = &self.limits;
        let counters = &mut self.counters;

        counters.frag_parsing_error_count += 1;
        counters.frag_parsing_total += 1;

        if counters.frag_parsing_total >= limits.frag_parsing_fatal_threshold {
            warn!(
                total = counters.frag_parsing_total,
                "Stream format incompatible, giving up"
            );
            return RecoveryAction::Fatal(FatalReason::CodecError);
        }

        if limits.frag_parsing_switch_every > 0
            && counters.frag_parsing_error_count % limits.frag_parsing_switch_every == 0
        {
            if let Some(target) = adjacent_level(levels, current_level) {
                counters.frag_parsing_error_count = 0;
                return RecoveryAction::SwitchLevel(target);
            }
        }

        RecoveryAction::Ignore
    }
}

//! Subtitle pipeline - fetch, parse, synchronize and merge subtitle tracks

mod cues;
mod parser;
mod pipeline;
mod search;
mod selection;

pub use cues::{active_cue_at, cues_at_time};
pub use parser::{parse_cues, parse_timestamp, parse_timing_line, strip_tags};
pub use pipeline::{
    load_track, HttpSubtitleFetcher, SubtitleFetcher, SubtitleOutcome, SubtitlePipeline,
};
pub use search::{
    HttpSubtitleSearch, SearchRequest, SearchResponse, SubtitleSearch, SubtitleSearchResult,
};
pub use selection::{auto_select, external_track, merge_tracks};

#[cfg(test)]
pub(crate) use pipeline::testing;

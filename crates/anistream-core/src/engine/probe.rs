//! HLS manifest probe
//!
//! Fetches a manifest (through the proxy gateway when the source needs a
//! spoofed referer) and lists its renditions the same way the engine
//! surfaces them. Used for diagnostics; playback itself never parses
//! manifests, the demuxer does.

use super::levels::sort_levels;
use crate::error::{Error, Result};
use crate::proxy::ProxyGateway;
use crate::types::{QualityLevel, StreamSource};
use m3u8_rs::Playlist;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// What a manifest offers
#[derive(Debug, Clone, Serialize)]
pub struct ManifestSummary {
    /// Renditions sorted by descending resolution
    pub levels: Vec<QualityLevel>,
    /// True for a multivariant (master) playlist
    pub is_master: bool,
    /// True when the media playlist has no end tag
    pub is_live: bool,
    /// Total duration of a media playlist (seconds)
    pub duration: Option<f64>,
    /// Media segments listed by a media playlist
    pub segment_count: usize,
}

/// Parse manifest text
pub fn parse_manifest(content: &str) -> Result<ManifestSummary> {
    let playlist = m3u8_rs::parse_playlist_res(content.as_bytes())
        .map_err(|e| Error::ManifestParse(format!("Failed to parse HLS playlist: {:?}", e)))?;

    let summary = match playlist {
        Playlist::MasterPlaylist(master) => {
            let mut levels: Vec<QualityLevel> = master
                .variants
                .iter()
                .filter(|v| !v.is_i_frame)
                .enumerate()
                .map(|(idx, variant)| {
                    let (width, height) = variant
                        .resolution
                        .map(|r| (r.width as u32, r.height as u32))
                        .unwrap_or((0, 0));
                    QualityLevel::new(idx as i32, width, height, variant.bandwidth)
                })
                .collect();
            sort_levels(&mut levels);

            ManifestSummary {
                levels,
                is_master: true,
                is_live: false,
                duration: None,
                segment_count: 0,
            }
        }
        Playlist::MediaPlaylist(media) => {
            let duration: f64 = media.segments.iter().map(|s| s.duration as f64).sum();
            ManifestSummary {
                levels: Vec::new(),
                is_master: false,
                is_live: !media.end_list,
                duration: media.end_list.then_some(duration),
                segment_count: media.segments.len(),
            }
        }
    };

    Ok(summary)
}

/// Fetches and summarizes manifests
pub struct ManifestProbe {
    client: Client,
    proxy: Option<ProxyGateway>,
}

impl ManifestProbe {
    pub fn new(proxy: Option<ProxyGateway>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, proxy })
    }

    pub fn with_client(client: Client, proxy: Option<ProxyGateway>) -> Self {
        Self { client, proxy }
    }

    /// Fetch and parse the manifest of `source`
    #[instrument(skip(self), fields(url = %source.url))]
    pub async fn probe(&self, source: &StreamSource) -> Result<ManifestSummary> {
        if !source.is_adaptive_manifest {
            return Err(Error::ManifestParse(
                "progressive sources have no manifest".to_string(),
            ));
        }

        let url = match &self.proxy {
            Some(proxy) => proxy.route(&source.url, source.referer_override.as_deref()),
            None => source.url.clone(),
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::ManifestFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::ManifestFetch(format!(
                "{} returned {}",
                source.url,
                response.status()
            )));
        }

        let content = response
            .text()
            .await
            .map_err(|e| Error::ManifestFetch(e.to_string()))?;

        let summary = parse_manifest(&content)?;
        debug!(
            levels = summary.levels.len(),
            is_master = summary.is_master,
            "Manifest probed"
        );
        Ok(summary)
    }
}

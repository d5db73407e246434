//! CORS proxy gateway
//!
//! Upstream hosts frequently reject cross-origin requests or insist on a
//! specific `Referer`. Every manifest, fragment and subtitle fetch that needs
//! either goes through `GET /proxy?url=<enc>&referer=<enc>`.

use crate::error::Result;
use url::Url;

/// Builds proxied URLs against a gateway base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyGateway {
    endpoint: Url,
}

impl ProxyGateway {
    /// `base` is the gateway origin, e.g. `https://api.example.com/`
    pub fn new(base: &Url) -> Result<Self> {
        Ok(Self {
            endpoint: base.join("proxy")?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Proxied form of `upstream`
    pub fn wrap(&self, upstream: &str, referer: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("url", upstream);
            if let Some(referer) = referer {
                query.append_pair("referer", referer);
            }
        }
        url
    }

    /// True when `url` already points at this gateway
    pub fn is_proxied(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| {
                u.origin() == self.endpoint.origin() && u.path() == self.endpoint.path()
            })
            .unwrap_or(false)
    }

    /// Route through the gateway only when a referer must be spoofed
    pub fn route(&self, upstream: &str, referer: Option<&str>) -> String {
        match referer {
            Some(referer) if !self.is_proxied(upstream) => {
                self.wrap(upstream, Some(referer)).to_string()
            }
            _ => upstream.to_string(),
        }
    }
}

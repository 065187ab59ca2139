use crate::cloudflare::requests::{uncached_headers, Request};
use crate::errors::SpeedTestError;
use reqwest::header::HeaderMap;
use serde::de::IgnoredAny;
use url::Url;

/// A tiny GET used to time one round trip.
///
/// A `t=<unix millis>-<sequence>` query parameter makes every probe unique
/// so no cache between us and the server can answer it.
pub struct ProbeRequest<'a> {
    base: &'a Url,
    nonce: String,
}

impl<'a> ProbeRequest<'a> {
    pub fn new(base: &'a Url, sequence: u64) -> Self {
        let nonce =
            format!("{}-{}", chrono::Utc::now().timestamp_millis(), sequence);
        Self { base, nonce }
    }
}

impl Request for ProbeRequest<'_> {
    type Response = IgnoredAny;

    fn url(&self) -> Result<Url, SpeedTestError> {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("t", &self.nonce);
        Ok(url)
    }

    fn headers(&self) -> HeaderMap {
        uncached_headers()
    }
}

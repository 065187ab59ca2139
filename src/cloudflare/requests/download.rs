use crate::cloudflare::requests::{uncached_headers, Request};
use crate::errors::SpeedTestError;
use reqwest::header::HeaderMap;
use serde::de::IgnoredAny;
use url::Url;

/// GET of a server generated payload of `bytes` bytes.
#[derive(Copy, Clone)]
pub struct Download<'a> {
    pub base: &'a Url,
    pub bytes: u64,
}

impl Request for Download<'_> {
    type Response = IgnoredAny;

    fn url(&self) -> Result<Url, SpeedTestError> {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("bytes", &self.bytes.to_string());
        Ok(url)
    }

    fn headers(&self) -> HeaderMap {
        uncached_headers()
    }
}

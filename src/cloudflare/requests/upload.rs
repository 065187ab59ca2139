use crate::cloudflare::requests::{uncached_headers, Request};
use crate::errors::SpeedTestError;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::IgnoredAny;
use url::Url;

/// POST of one raw chunk.
pub struct Upload<'a> {
    base: &'a Url,
    data: &'a [u8],
}

impl<'a> Upload<'a> {
    pub fn new(base: &'a Url, data: &'a [u8]) -> Self {
        Self { base, data }
    }
}

impl Request for Upload<'_> {
    type Response = IgnoredAny;

    const METHOD: Method = Method::POST;

    fn url(&self) -> Result<Url, SpeedTestError> {
        Ok(self.base.clone())
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = uncached_headers();

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );

        headers
    }

    fn body(&self) -> Option<Vec<u8>> {
        Some(self.data.to_vec())
    }
}

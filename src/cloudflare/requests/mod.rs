extern crate serde;

pub mod download;
pub mod latency;
pub mod meta;
pub mod upload;

use crate::errors::SpeedTestError;
use reqwest::{
    header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA, USER_AGENT},
    Method,
};
use serde::Deserialize;
use url::Url;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent sent with every request, e.g. `speed-pulse/0.1.0 (3f2a9c1d0e)`.
pub fn user_agent() -> String {
    match option_env!("SPEEDPULSE_BUILD_GIT_HASH") {
        Some(hash) => format!("{}/{} ({})", NAME, VERSION, hash),
        None => format!("{}/{}", NAME, VERSION),
    }
}

/// Description of one HTTP exchange with a speed test server.
pub trait Request {
    type Response: for<'de> Deserialize<'de>;

    const METHOD: Method = Method::GET;

    /// Fully resolved URL, including any query parameters.
    fn url(&self) -> Result<Url, SpeedTestError>;

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&user_agent()) {
            headers.insert(USER_AGENT, value);
        }

        headers
    }

    fn body(&self) -> Option<Vec<u8>> {
        None
    }
}

impl<R: Request> Request for &R {
    type Response = R::Response;

    const METHOD: Method = R::METHOD;

    fn url(&self) -> Result<Url, SpeedTestError> {
        (**self).url()
    }

    fn headers(&self) -> HeaderMap {
        (**self).headers()
    }

    fn body(&self) -> Option<Vec<u8>> {
        (**self).body()
    }
}

/// Default headers plus the ones that keep caches out of a measurement.
pub(crate) fn uncached_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(&user_agent()) {
        headers.insert(USER_AGENT, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    headers
}

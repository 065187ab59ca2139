use crate::cloudflare::requests::{
    download::Download,
    latency::ProbeRequest,
    meta::{ConnectionInfo, MetaRequest},
    upload::Upload,
    Request,
};
use crate::errors::SpeedTestError;
use log::{debug, warn};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Network operations the measurement engine needs.
///
/// [`Client`] implements it over HTTP; tests substitute scripted doubles.
/// Implementations should not impose their own overall timeout on
/// [`Transport::open_download`] bodies: the engine bounds every operation.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Download: DownloadStream;

    /// One small cache-bypassing round trip to `url`.
    async fn probe(&self, url: &Url) -> Result<(), SpeedTestError>;

    /// Start streaming a `bytes` sized payload from `url`.
    async fn open_download(
        &self,
        url: &Url,
        bytes: u64,
    ) -> Result<Self::Download, SpeedTestError>;

    /// Send `payload` to `url` and wait for the server's acknowledgement.
    async fn upload(&self, url: &Url, payload: &[u8]) -> Result<(), SpeedTestError>;
}

/// An open download, read piece by piece.
#[allow(async_fn_in_trait)]
pub trait DownloadStream {
    /// Size of the next received piece, or `None` once the body is complete.
    async fn next_chunk(&mut self) -> Result<Option<usize>, SpeedTestError>;
}

impl<T: Transport> Transport for &T {
    type Download = T::Download;

    async fn probe(&self, url: &Url) -> Result<(), SpeedTestError> {
        (**self).probe(url).await
    }

    async fn open_download(
        &self,
        url: &Url,
        bytes: u64,
    ) -> Result<Self::Download, SpeedTestError> {
        (**self).open_download(url, bytes).await
    }

    async fn upload(&self, url: &Url, payload: &[u8]) -> Result<(), SpeedTestError> {
        (**self).upload(url, payload).await
    }
}

/// HTTP transport backed by reqwest.
#[derive(Debug)]
pub struct Client {
    client: ReqwestClient,
    probe_sequence: AtomicU64,
}

impl Client {
    pub fn new() -> Self {
        let client = ReqwestClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Client { client, probe_sequence: AtomicU64::new(0) }
    }

    /// Send a request whose response body is JSON.
    pub async fn send<R: Request>(
        &self,
        request: R,
    ) -> Result<R::Response, SpeedTestError> {
        let response = self.execute(&request).await?;
        let text = response.text().await?;

        Ok(serde_json::from_str(&text)?)
    }

    /// Look up who and where the client is, giving up after `limit`.
    ///
    /// Never fails: any error or timeout yields [`ConnectionInfo::unknown`].
    pub async fn connection_info(&self, url: &Url, limit: Duration) -> ConnectionInfo {
        match timeout(limit, self.send(MetaRequest { url })).await {
            Ok(Ok(meta)) => ConnectionInfo::from(meta),
            Ok(Err(e)) => {
                warn!("Connection lookup failed: {}", e.message);
                ConnectionInfo::unknown()
            }
            Err(_) => {
                warn!("Connection lookup timed out after {:?}", limit);
                ConnectionInfo::unknown()
            }
        }
    }

    async fn execute<R: Request>(
        &self,
        request: &R,
    ) -> Result<Response, SpeedTestError> {
        let url = request.url()?;
        debug!("{} {}", R::METHOD, url);

        let response = self
            .client
            .request(R::METHOD, url)
            .headers(request.headers())
            .speed_body(request.body())
            .send()
            .await?
            .error_for_status()?;

        Ok(response)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for Client {
    type Download = HttpDownload;

    async fn probe(&self, url: &Url) -> Result<(), SpeedTestError> {
        let sequence = self.probe_sequence.fetch_add(1, Ordering::Relaxed);
        let response = self.execute(&ProbeRequest::new(url, sequence)).await?;
        // The round trip only ends once the (small) body has arrived.
        response.bytes().await?;
        Ok(())
    }

    async fn open_download(
        &self,
        url: &Url,
        bytes: u64,
    ) -> Result<HttpDownload, SpeedTestError> {
        let response = self.execute(&Download { base: url, bytes }).await?;
        Ok(HttpDownload { response })
    }

    async fn upload(&self, url: &Url, payload: &[u8]) -> Result<(), SpeedTestError> {
        let response = self.execute(&Upload::new(url, payload)).await?;
        response.bytes().await?;
        Ok(())
    }
}

/// Streaming body of a download response.
#[derive(Debug)]
pub struct HttpDownload {
    response: Response,
}

impl DownloadStream for HttpDownload {
    async fn next_chunk(&mut self) -> Result<Option<usize>, SpeedTestError> {
        Ok(self.response.chunk().await?.map(|chunk| chunk.len()))
    }
}

trait RequestBuilderExt: Sized {
    fn speed_body(self, body: Option<Vec<u8>>) -> Self;
}

impl RequestBuilderExt for RequestBuilder {
    fn speed_body(self, body: Option<Vec<u8>>) -> Self {
        match body {
            None => self,
            Some(bytes) => self.body(bytes),
        }
    }
}

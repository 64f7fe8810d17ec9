use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::EtlError;

pub trait MatrixFetcher: Send + Sync {
    /// Raw (still compressed) response body of a successful GET.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, EtlError>;
}

#[derive(Clone)]
pub struct HttpMatrixFetcher {
    client: Client,
}

impl HttpMatrixFetcher {
    pub fn new(timeout: Duration) -> Result<Self, EtlError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("tcga-etl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EtlError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| EtlError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl MatrixFetcher for HttpMatrixFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, EtlError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| EtlError::Http(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download request failed".to_string());
            return Err(EtlError::HttpStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| EtlError::Http(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

pub fn gunzip(compressed: &[u8]) -> Result<Vec<u8>, EtlError> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| EtlError::Decompress(err.to_string()))?;
    Ok(out)
}

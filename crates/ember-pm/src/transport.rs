//! Network transport
//!
//! The pipeline talks to the registry only through [`Transport`], so tests
//! and offline builds can swap the HTTP client out.

use crate::error::{PmError, Result};
use reqwest::blocking::{Client, RequestBuilder};
use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Status code and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP operations used by fetch, publish and search
pub trait Transport: Send + Sync {
    /// GET `url`
    fn get(&self, url: &str, token: Option<&str>) -> Result<Response>;

    /// Download `url` into `dest`. Non-success statuses are errors.
    fn download_file(&self, url: &str, dest: &Path, token: Option<&str>) -> Result<()>;

    /// POST the contents of `file` to `url`
    fn upload_file(&self, url: &str, file: &Path, token: Option<&str>) -> Result<Response>;
}

/// Transport for builds without network access; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn get(&self, url: &str, _token: Option<&str>) -> Result<Response> {
        Err(PmError::Network(format!("offline: GET {}", url)))
    }

    fn download_file(&self, url: &str, _dest: &Path, _token: Option<&str>) -> Result<()> {
        Err(PmError::Network(format!("offline: download {}", url)))
    }

    fn upload_file(&self, url: &str, _file: &Path, _token: Option<&str>) -> Result<Response> {
        Err(PmError::Network(format!("offline: upload {}", url)))
    }
}

/// Blocking reqwest client
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a client; `timeout_secs` bounds connection setup
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(timeout_secs))
            .user_agent(format!("emberpm/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PmError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    fn authorized(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn network(url: &str, err: reqwest::Error) -> PmError {
    PmError::Network(format!("{}: {}", url, err))
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, token: Option<&str>) -> Result<Response> {
        debug!(url, "GET");
        let response = Self::authorized(self.client.get(url), token)
            .send()
            .map_err(|e| network(url, e))?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| network(url, e))?;
        Ok(Response { status, body })
    }

    fn download_file(&self, url: &str, dest: &Path, token: Option<&str>) -> Result<()> {
        debug!(url, dest = %dest.display(), "download");
        let mut response = Self::authorized(self.client.get(url), token)
            .send()
            .map_err(|e| network(url, e))?;

        if !response.status().is_success() {
            return Err(PmError::Network(format!(
                "download of {} failed with status {}",
                url,
                response.status()
            )));
        }

        let mut file = File::create(dest).map_err(|e| PmError::io(dest, e))?;
        if let Err(e) = response.copy_to(&mut file) {
            drop(file);
            let _ = fs::remove_file(dest);
            return Err(network(url, e));
        }
        Ok(())
    }

    fn upload_file(&self, url: &str, file: &Path, token: Option<&str>) -> Result<Response> {
        debug!(url, file = %file.display(), "upload");
        let body = File::open(file).map_err(|e| PmError::io(file, e))?;
        let response = Self::authorized(self.client.post(url), token)
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(body)
            .send()
            .map_err(|e| network(url, e))?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| network(url, e))?;
        Ok(Response { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_offline_transport_always_fails() {
        let transport = OfflineTransport;
        let err = transport.get("https://packages.example.org/search", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(transport
            .download_file("https://x", Path::new("/tmp/never"), Some("t"))
            .is_err());
    }

    #[test]
    fn test_response_success_range() {
        let ok = Response {
            status: 204,
            body: String::new(),
        };
        let missing = Response {
            status: 404,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!missing.is_success());
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new(5).is_ok());
    }
}

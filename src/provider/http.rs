//! HTTP(S) sources via a blocking client

use super::{
    read_verified, store_verified, verify_destination, Artifact, FetchContext, Provider,
    SourceRequest,
};
use crate::error::{ConvergeError, Result};
use reqwest::blocking::{Client, Response};
use std::time::Duration;
use tracing::info;

pub struct HttpProvider {
    client: Client,
    timeout: Duration,
}

impl HttpProvider {
    /// Create a provider whose downloads are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15).min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| ConvergeError::Config(format!("HTTP client: {}", e)))?;
        Ok(HttpProvider { client, timeout })
    }
}

impl Provider for HttpProvider {
    fn protocols(&self) -> Vec<String> {
        vec!["http".to_string(), "https".to_string()]
    }

    fn parse(&self, request: SourceRequest) -> Result<Box<dyn Artifact>> {
        Ok(Box::new(HttpArtifact {
            client: self.client.clone(),
            timeout: self.timeout,
            request,
        }))
    }
}

struct HttpArtifact {
    client: Client,
    timeout: Duration,
    request: SourceRequest,
}

impl HttpArtifact {
    fn download_error(&self, reason: impl Into<String>) -> ConvergeError {
        ConvergeError::Download {
            source_uri: self.request.source.clone(),
            reason: reason.into(),
        }
    }

    /// Issue the GET, bounded by the provider timeout and the context deadline
    fn get(&self, ctx: &FetchContext<'_>) -> Result<Response> {
        let timeout = ctx
            .remaining()
            .map_or(self.timeout, |left| left.min(self.timeout));
        if timeout.is_zero() {
            return Err(self.download_error("deadline expired before request"));
        }

        let response = self
            .client
            .get(&self.request.source)
            .timeout(timeout)
            .send()
            .map_err(|e| self.download_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.download_error(format!("server returned {}", status)));
        }
        Ok(response)
    }
}

impl Artifact for HttpArtifact {
    fn verify(&self, ctx: &FetchContext<'_>) -> Result<bool> {
        verify_destination(&self.request, ctx)
    }

    fn download(&self, ctx: &FetchContext<'_>) -> Result<()> {
        let mut response = self.get(ctx)?;
        let bytes = store_verified(&self.request, ctx, &mut response)?;
        info!(
            "Downloaded {} bytes from {} to {:?}",
            bytes, self.request.source, self.request.destination
        );
        Ok(())
    }

    fn preview(&self, ctx: &FetchContext<'_>) -> Result<Vec<u8>> {
        let mut response = self.get(ctx)?;
        read_verified(&self.request, ctx, &mut response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashRegistry;
    use crate::resource::Params;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    /// Serve exactly one HTTP response on an ephemeral port
    fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let header = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(body);
            }
        });
        format!("http://{}/file.txt", addr)
    }

    fn request(source: String, destination: std::path::PathBuf) -> SourceRequest {
        SourceRequest {
            id: "h".into(),
            source,
            destination,
            hash: Some("3610a686".into()),
            skip_verify: false,
            params: Params::new(),
        }
    }

    #[test]
    fn test_http_download() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("3610a686");
        let url = serve_once("200 OK", b"hello");

        let hashes = HashRegistry::with_builtins();
        let ctx = FetchContext::new(&hashes).with_timeout(Duration::from_secs(10));
        let provider = HttpProvider::new(Duration::from_secs(10)).unwrap();
        let artifact = provider.parse(request(url, dest.clone())).unwrap();

        artifact.download(&ctx).unwrap();
        assert!(artifact.verify(&ctx).unwrap());
        assert_eq!(std::fs::read(dest).unwrap(), b"hello");
    }

    #[test]
    fn test_http_preview() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("3610a686");
        let url = serve_once("200 OK", b"hello");

        let hashes = HashRegistry::with_builtins();
        let ctx = FetchContext::new(&hashes);
        let provider = HttpProvider::new(Duration::from_secs(10)).unwrap();
        let artifact = provider.parse(request(url, dest.clone())).unwrap();

        assert_eq!(artifact.preview(&ctx).unwrap(), b"hello");
        assert!(!dest.exists());
    }

    #[test]
    fn test_http_error_status() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("3610a686");
        let url = serve_once("404 Not Found", b"");

        let hashes = HashRegistry::with_builtins();
        let ctx = FetchContext::new(&hashes);
        let provider = HttpProvider::new(Duration::from_secs(10)).unwrap();
        let artifact = provider.parse(request(url, dest.clone())).unwrap();

        let err = artifact.download(&ctx).unwrap_err();
        assert!(matches!(err, ConvergeError::Download { ref reason, .. } if reason.contains("404")));
        assert!(!dest.exists());
    }
}

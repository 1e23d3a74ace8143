//! Local filesystem sources (`file:///path` or `/path`)

use super::{
    read_verified, store_verified, verify_destination, Artifact, FetchContext, Provider,
    SourceRequest,
};
use crate::error::{ConvergeError, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use tracing::info;

pub struct FileProvider;

impl Provider for FileProvider {
    fn protocols(&self) -> Vec<String> {
        vec!["file".to_string()]
    }

    fn parse(&self, request: SourceRequest) -> Result<Box<dyn Artifact>> {
        let path = request
            .source
            .strip_prefix("file://")
            .unwrap_or(&request.source);
        if !path.starts_with('/') {
            return Err(ConvergeError::UnknownProtocol(request.source.clone()));
        }
        Ok(Box::new(FileArtifact {
            path: PathBuf::from(path),
            request,
        }))
    }
}

struct FileArtifact {
    path: PathBuf,
    request: SourceRequest,
}

impl FileArtifact {
    fn open(&self) -> Result<BufReader<File>> {
        File::open(&self.path)
            .map(BufReader::new)
            .map_err(|e| ConvergeError::Download {
                source_uri: self.request.source.clone(),
                reason: match e.kind() {
                    io::ErrorKind::NotFound => "source file does not exist".to_string(),
                    _ => e.to_string(),
                },
            })
    }
}

impl Artifact for FileArtifact {
    fn verify(&self, ctx: &FetchContext<'_>) -> Result<bool> {
        verify_destination(&self.request, ctx)
    }

    fn download(&self, ctx: &FetchContext<'_>) -> Result<()> {
        let bytes = store_verified(&self.request, ctx, &mut self.open()?)?;
        info!(
            "Copied {} bytes from {:?} to {:?}",
            bytes, self.path, self.request.destination
        );
        Ok(())
    }

    fn preview(&self, ctx: &FetchContext<'_>) -> Result<Vec<u8>> {
        read_verified(&self.request, ctx, &mut self.open()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashRegistry;
    use crate::resource::Params;
    use std::fs;
    use tempfile::TempDir;

    fn request(source: String, destination: PathBuf, hash: Option<&str>) -> SourceRequest {
        SourceRequest {
            id: "f".into(),
            source,
            destination,
            hash: hash.map(str::to_string),
            skip_verify: false,
            params: Params::new(),
        }
    }

    #[test]
    fn test_download_then_verify() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, b"hello").unwrap();
        let dest = dir.path().join("cache").join("3610a686");

        let hashes = HashRegistry::with_builtins();
        let ctx = FetchContext::new(&hashes);
        let artifact = FileProvider
            .parse(request(
                format!("file://{}", src.display()),
                dest.clone(),
                Some("3610a686"),
            ))
            .unwrap();

        assert!(artifact.verify(&ctx).unwrap_err().is_not_found());
        artifact.download(&ctx).unwrap();
        assert!(artifact.verify(&ctx).unwrap());
        assert_eq!(fs::read(dest).unwrap(), b"hello");
    }

    #[test]
    fn test_preview_leaves_destination_alone() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, b"hello").unwrap();
        let dest = dir.path().join("cache").join("3610a686");

        let hashes = HashRegistry::with_builtins();
        let ctx = FetchContext::new(&hashes);
        let artifact = FileProvider
            .parse(request(src.display().to_string(), dest.clone(), Some("3610a686")))
            .unwrap();

        assert_eq!(artifact.preview(&ctx).unwrap(), b"hello");
        assert!(!dest.exists());
        assert!(!dir.path().join("cache").exists());
    }

    #[test]
    fn test_download_rejects_wrong_hash() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, b"hello").unwrap();
        let dest = dir.path().join("00000000");

        let hashes = HashRegistry::with_builtins();
        let ctx = FetchContext::new(&hashes);
        let artifact = FileProvider
            .parse(request(src.display().to_string(), dest.clone(), Some("00000000")))
            .unwrap();

        assert!(matches!(
            artifact.download(&ctx),
            Err(ConvergeError::HashMismatch { .. })
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_missing_source_is_download_error() {
        let dir = TempDir::new().unwrap();
        let hashes = HashRegistry::with_builtins();
        let ctx = FetchContext::new(&hashes);
        let artifact = FileProvider
            .parse(request(
                dir.path().join("nope").display().to_string(),
                dir.path().join("dest"),
                Some("3610a686"),
            ))
            .unwrap();
        assert!(matches!(
            artifact.download(&ctx),
            Err(ConvergeError::Download { .. })
        ));
    }
}

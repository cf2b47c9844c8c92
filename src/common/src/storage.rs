use anyhow::{Context, Result};
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use crate::config::StorageConfig;

/// Where export bundles are written, as described by a storage DSN.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageLocation {
    /// `file:///path`; `file:///.data/x` is relative to the working directory.
    File(PathBuf),
    /// `memory://`, used by tests and dry runs.
    Memory,
    /// `s3://[access_key:secret_key@]host[:port]/bucket`
    S3(Url),
}

impl StorageLocation {
    pub fn parse(dsn: &str) -> Result<Self> {
        let url =
            Url::parse(dsn).map_err(|e| anyhow::anyhow!("Invalid storage DSN '{dsn}': {e}"))?;

        match url.scheme() {
            "file" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    anyhow::bail!("File DSN must specify a path: file:///path/to/bundles");
                }
                let path = match path.strip_prefix("/.") {
                    Some(rest) => format!(".{rest}"),
                    None => path.to_string(),
                };
                Ok(Self::File(PathBuf::from(path)))
            }
            "memory" => Ok(Self::Memory),
            "s3" => Ok(Self::S3(url)),
            scheme => {
                anyhow::bail!("Unsupported storage scheme: {scheme}. Supported: file, memory, s3")
            }
        }
    }

    /// Build the object store, creating the bundle directory for local paths.
    pub fn build(&self) -> Result<Arc<dyn ObjectStore>> {
        match self {
            Self::File(path) => {
                std::fs::create_dir_all(path).with_context(|| {
                    format!("Failed to create bundle directory {}", path.display())
                })?;
                Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
            }
            Self::Memory => Ok(Arc::new(InMemory::new())),
            Self::S3(url) => Ok(Arc::new(create_s3_builder_from_dsn(url)?.build()?)),
        }
    }
}

/// Create the bundle object store from storage configuration
pub fn create_object_store(storage_config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    create_object_store_from_dsn(&storage_config.dsn)
}

pub fn create_object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    StorageLocation::parse(dsn)?.build()
}

/// Create an S3 builder from a DSN
pub fn create_s3_builder_from_dsn(dsn: &Url) -> Result<AmazonS3Builder> {
    let host = dsn
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in DSN"))?;
    let bucket = dsn.path().trim_start_matches('/');
    if bucket.is_empty() {
        anyhow::bail!("S3 DSN must specify a bucket: s3://host/bucket");
    }

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region(std::env::var("AWS_DEFAULT_REGION").unwrap_or_else(|_| "us-east-1".into()));

    if !dsn.username().is_empty() {
        builder = builder
            .with_access_key_id(dsn.username())
            .with_secret_access_key(dsn.password().unwrap_or(""));
    }

    // S3-compatible stores (MinIO) need an explicit path-style endpoint.
    if !host.contains("amazonaws.com") {
        let port = dsn.port();
        let scheme = if port == Some(443) { "https" } else { "http" };
        let endpoint = match port {
            Some(p) => format!("{scheme}://{host}:{p}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    Ok(builder)
}

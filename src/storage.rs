//! Whole-object reads and writes against local files or S3.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use std::fmt;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use tokio::sync::OnceCell;

/// Where a file lives: a local path or an `s3://bucket/key` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    S3 { bucket: String, key: String },
}

impl Location {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match raw.strip_prefix("s3://") {
            Some(rest) => {
                let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    anyhow::bail!("S3 location has no bucket: {}", raw);
                }
                Ok(Location::S3 {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            None => Ok(Location::Local(PathBuf::from(raw))),
        }
    }

    /// Location of `name` inside this directory or key prefix.
    pub fn join(&self, name: &str) -> Self {
        match self {
            Location::Local(dir) => Location::Local(dir.join(name)),
            Location::S3 { bucket, key } => {
                let prefix = key.trim_end_matches('/');
                let key = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", prefix, name)
                };
                Location::S3 { bucket: bucket.clone(), key }
            }
        }
    }

    pub fn is_s3(&self) -> bool {
        matches!(self, Location::S3 { .. })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, location: &Location) -> Result<Vec<u8>>;
    async fn put(&self, location: &Location, bytes: Vec<u8>) -> Result<()>;

    /// Blocking reader over the object, for streaming parsers.
    async fn open(&self, location: &Location) -> Result<Box<dyn Read + Send>> {
        let bytes = self.get(location).await?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

pub struct LocalStore;

fn local_path(location: &Location) -> Result<&PathBuf> {
    match location {
        Location::Local(path) => Ok(path),
        other => anyhow::bail!("not a local path: {}", other),
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn get(&self, location: &Location) -> Result<Vec<u8>> {
        let path = local_path(location)?;
        tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
    }

    async fn put(&self, location: &Location, bytes: Vec<u8>) -> Result<()> {
        let path = local_path(location)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }

    async fn open(&self, location: &Location) -> Result<Box<dyn Read + Send>> {
        let path = local_path(location)?;
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Box::new(file))
    }
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// Client configured from the standard AWS environment and credential chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
        }
    }
}

fn s3_parts(location: &Location) -> Result<(&str, &str)> {
    match location {
        Location::S3 { bucket, key } if !key.is_empty() => Ok((bucket.as_str(), key.as_str())),
        other => anyhow::bail!("not an S3 object location: {}", other),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, location: &Location) -> Result<Vec<u8>> {
        let (bucket, key) = s3_parts(location)?;
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("S3 GET {} failed", location))?;
        let data = output
            .body
            .collect()
            .await
            .with_context(|| format!("S3 GET {} body read failed", location))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn put(&self, location: &Location, bytes: Vec<u8>) -> Result<()> {
        let (bucket, key) = s3_parts(location)?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("S3 PUT {} failed", location))?;
        Ok(())
    }
}

/// Dispatches by location kind. The S3 client is built on first S3 access,
/// so local-only runs never touch AWS configuration.
#[derive(Default)]
pub struct Store {
    s3: OnceCell<S3Store>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    async fn backend(&self, location: &Location) -> &dyn ObjectStore {
        if location.is_s3() {
            let s3: &S3Store = self.s3.get_or_init(S3Store::from_env).await;
            return s3;
        }
        &LocalStore
    }
}

#[async_trait]
impl ObjectStore for Store {
    async fn get(&self, location: &Location) -> Result<Vec<u8>> {
        self.backend(location).await.get(location).await
    }

    async fn put(&self, location: &Location, bytes: Vec<u8>) -> Result<()> {
        tracing::debug!(%location, bytes = bytes.len(), "writing object");
        self.backend(location).await.put(location, bytes).await
    }

    async fn open(&self, location: &Location) -> Result<Box<dyn Read + Send>> {
        self.backend(location).await.open(location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locations() {
        assert_eq!(
            Location::parse("data/input/ml_devices.csv").unwrap(),
            Location::Local(PathBuf::from("data/input/ml_devices.csv"))
        );
        assert_eq!(
            Location::parse("s3://fda-bucket/input/device-510k.json").unwrap(),
            Location::S3 {
                bucket: "fda-bucket".to_string(),
                key: "input/device-510k.json".to_string()
            }
        );
        assert!(Location::parse("s3:///key").is_err());
    }

    #[test]
    fn test_join_output_file() {
        let dir = Location::parse("s3://fda-bucket/output/").unwrap();
        assert_eq!(dir.join("aiml_info.csv").to_string(), "s3://fda-bucket/output/aiml_info.csv");
        let bare = Location::parse("s3://fda-bucket").unwrap();
        assert_eq!(bare.join("aiml_info.csv").to_string(), "s3://fda-bucket/aiml_info.csv");
        let local = Location::parse("data/output").unwrap();
        assert_eq!(local.join("aiml_info.csv"), Location::Local(PathBuf::from("data/output/aiml_info.csv")));
    }

    #[tokio::test]
    async fn test_local_put_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let location = Location::Local(dir.path().join("nested/out/file.csv"));
        let store = Store::new();
        store.put(&location, b"a,b\n".to_vec()).await.unwrap();
        assert_eq!(store.get(&location).await.unwrap(), b"a,b\n");

        let mut text = String::new();
        store.open(&location).await.unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "a,b\n");
    }

    #[tokio::test]
    async fn test_missing_local_file_names_path() {
        let store = Store::new();
        let err = store
            .get(&Location::Local(PathBuf::from("/nonexistent/device-510k.json")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("device-510k.json"));
    }
}

//! URL parsing for storage backends.
//!
//! Recognises S3 URLs (`s3://`, path-style, virtual-hosted and
//! `s3::http://host:port/bucket` custom endpoints) and local filesystem paths.

use object_store::path::Path;
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{LocalConfig, S3Config};

const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("storage URL pattern is valid"))
        .collect()
}

// Order matters: the endpoint form must be tried before the plain `s3://` form.
static S3_MATCHERS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[S3_PATH, S3_VIRTUAL, S3_ENDPOINT_URL, S3_URL]));
static LOCAL_MATCHERS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[FILE_URI, FILE_URL, FILE_PATH]));

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        if let Some(caps) = S3_MATCHERS.iter().find_map(|r| r.captures(url)) {
            return Ok(Self::parse_s3(&caps));
        }
        if let Some(caps) = LOCAL_MATCHERS.iter().find_map(|r| r.captures(url)) {
            return Ok(Self::parse_local(&caps));
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: &regex::Captures) -> Self {
        let bucket = matches
            .name("bucket")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{protocol}://{}:{port}", endpoint.as_str())
            })
        });

        let key = matches.name("key").map(|m| m.as_str().into());

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key,
        })
    }

    fn parse_local(matches: &regex::Captures) -> Self {
        let path = matches.name("path").map(|m| m.as_str()).unwrap_or_default();
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let path = path.trim_end_matches('/');

        BackendConfig::Local(LocalConfig {
            path: if path.is_empty() { "/" } else { path }.to_string(),
        })
    }

    /// Key prefix inside the bucket, if any. Local stores are rooted at
    /// their path and have no prefix.
    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_url_parsing() {
        let config = BackendConfig::parse_url("s3://ingestion-zone/raw").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "ingestion-zone");
                assert_eq!(s3.key, Some(Path::from("raw")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_bucket_only() {
        let config = BackendConfig::parse_url("s3://processed-zone").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "processed-zone");
                assert_eq!(s3.key, None);
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_path_style_url() {
        let config =
            BackendConfig::parse_url("https://s3.eu-west-2.amazonaws.com/ingestion-zone/raw")
                .unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "ingestion-zone");
                assert_eq!(s3.key, Some(Path::from("raw")));
                if std::env::var("AWS_DEFAULT_REGION").is_err() {
                    assert_eq!(s3.region, Some("eu-west-2".to_string()));
                }
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_endpoint_url() {
        let config =
            BackendConfig::parse_url("s3::http://localhost:9000/warehouse/tables").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "warehouse");
                if std::env::var("AWS_ENDPOINT").is_err() {
                    assert_eq!(s3.endpoint, Some("http://localhost:9000".to_string()));
                }
                assert_eq!(s3.key, Some(Path::from("tables")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_local_forms() {
        for url in ["/srv/tote/staging", "file:///srv/tote/staging", "file:/srv/tote/staging/"] {
            match BackendConfig::parse_url(url).unwrap() {
                BackendConfig::Local(local) => assert_eq!(local.path, "/srv/tote/staging"),
                _ => panic!("Expected Local config for {url}"),
            }
        }
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            BackendConfig::parse_url("gs://bucket/data"),
            Err(StorageError::InvalidUrl { .. })
        ));
        assert!(BackendConfig::parse_url("relative/path").is_err());
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CryptError, CryptResult};
use crate::types::Visibility;

/// Default plaintext bytes per sealed chunk
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Top-level configuration (loaded from ossvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OssVaultConfig {
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub encryption: EncryptionConfig,
}

impl OssVaultConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> CryptResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            CryptError::invalid_config(format!("reading config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| CryptError::invalid_config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> CryptResult<Self> {
        toml::from_str(content)
            .map_err(|e| CryptError::invalid_config(format!("parsing config: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info); RUST_LOG takes precedence
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Key prefix every path is placed under
    pub root: String,
    /// Public base URL used by `url()` instead of the endpoint
    pub cdn_url: Option<String>,
    /// Enforce HTTPS for S3 connections (error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Visibility reported for objects and applied to new writes
    pub default_visibility: Visibility,
}

/// Streaming encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Base64 (standard alphabet) 32-byte secret key; absent means no encryption
    pub key: Option<String>,
    /// Plaintext bytes per chunk
    pub chunk_size: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "ossvault".into(),
            root: String::new(),
            cdn_url: None,
            enforce_tls: false,
            default_visibility: Visibility::Private,
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            key: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[log]
level = "debug"
format = "json"

[storage]
endpoint = "https://oss.example.com"
region = "eu-central-1"
bucket = "media"
root = "tenants/42"
cdn_url = "https://cdn.example.com"
enforce_tls = true
default_visibility = "public"

[encryption]
key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
chunk_size = 8192
"#;
        let config = OssVaultConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.storage.endpoint, "https://oss.example.com");
        assert_eq!(config.storage.root, "tenants/42");
        assert_eq!(config.storage.cdn_url.as_deref(), Some("https://cdn.example.com"));
        assert!(config.storage.enforce_tls);
        assert_eq!(config.storage.default_visibility, Visibility::Public);
        assert!(config.encryption.key.is_some());
        assert_eq!(config.encryption.chunk_size, 8192);
    }

    #[test]
    fn test_parse_defaults() {
        let config = OssVaultConfig::from_toml("").unwrap();

        assert_eq!(config.log.level, "info");
        assert_eq!(config.storage.bucket, "ossvault");
        assert_eq!(config.storage.default_visibility, Visibility::Private);
        assert!(config.encryption.key.is_none());
        assert_eq!(config.encryption.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[encryption]
chunk_size = 1024
"#;
        let config = OssVaultConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.encryption.chunk_size, 1024);
        assert!(config.encryption.key.is_none());
        assert_eq!(config.storage.region, "us-east-1");
    }

    #[test]
    fn test_malformed_config_is_invalid_configuration() {
        let err = OssVaultConfig::from_toml("[encryption]\nchunk_size = \"big\"").unwrap_err();
        assert!(matches!(err, CryptError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = OssVaultConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.encryption.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ossvault.toml");
        std::fs::write(&path, "[storage]\nbucket = \"backups\"\n").unwrap();

        let config = OssVaultConfig::load(&path).unwrap();
        assert_eq!(config.storage.bucket, "backups");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = OssVaultConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = OssVaultConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.storage.endpoint, parsed.storage.endpoint);
        assert_eq!(config.encryption.chunk_size, parsed.encryption.chunk_size);
    }
}

use mc_error::{CoreError, CoreResult};

/// Process-wide configuration for the media-core crates.
///
/// Not part of the spec's feature surface — ambient configuration, loaded
/// once at process start and injected into the cache/media-reader
/// constructors, in the style of the `FileCacheConfig` pattern seen in the
/// reference pack (validate-on-construct, serde-deserializable).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MediaCoreConfig {
    /// Soft cap on the in-memory cache's total byte size.
    pub max_cache_bytes: u64,

    /// Path to the `ffmpeg` binary, if not on `PATH`.
    pub ffmpeg_path: Option<String>,

    /// Timeout for blob-store downloads.
    pub blob_download_timeout_secs: u64,

    /// `RUST_LOG`-style filter string applied by `media_core::setup::init_logging`.
    pub log_filter: String,
}

impl Default for MediaCoreConfig {
    fn default() -> Self {
        Self {
            max_cache_bytes: 512 * 1024 * 1024,
            ffmpeg_path: None,
            blob_download_timeout_secs: 60,
            log_filter: "info".to_owned(),
        }
    }
}

impl MediaCoreConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_cache_bytes == 0 {
            return Err(CoreError::invalid_argument(
                "max_cache_bytes must be greater than zero",
            ));
        }
        if self.blob_download_timeout_secs == 0 {
            return Err(CoreError::invalid_argument(
                "blob_download_timeout_secs must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(MediaCoreConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_cache_bytes_is_rejected() {
        let cfg = MediaCoreConfig {
            max_cache_bytes: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}

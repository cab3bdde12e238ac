//! ImageResolver port - 添付画像のダウンロード

use std::path::PathBuf;

use async_trait::async_trait;

/// Outcome of resolving an image attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageResolution {
    /// Image saved locally.
    Available(PathBuf),
    /// Token exchange or download failed; the cause has been logged.
    Unavailable,
}

impl ImageResolution {
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            ImageResolution::Available(p) => Some(p),
            ImageResolution::Unavailable => None,
        }
    }
}

/// Exchanges a platform download code for a local file.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(&self, download_code: &str) -> ImageResolution;
}

//! Unifies three raw media sources — decoded video frames, images on a local
//! filesystem path, images in a remote blob store — behind one lazy sequence
//! interface yielding frames in ascending frame-id order.
//!
//! Three backend structs implement [`MediaReader`]; which one a [`Task`] gets
//! is a `match` on [`StorageBackend`], not a trait-object factory, since the
//! set of backings is closed.

mod cloud;
mod local;
mod video;

pub use cloud::CloudImageReader;
pub use local::LocalImageReader;
pub use video::VideoReader;

use mc_error::CoreResult;
use mc_types::{StorageBackend, Task};

/// A decoded video frame: raw `bgr24` pixel data plus its native dimensions.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major, `BGR` channel order (matches
    /// `ffmpeg`'s `bgr24` pixel format and the provider's numpy-array output).
    pub bgr: Vec<u8>,
}

/// Either a decoded video frame or an as-yet-undecoded image byte-buffer.
#[derive(Debug, Clone)]
pub enum FrameBody {
    Video(DecodedFrame),
    EncodedImage(Vec<u8>),
}

/// One `(frame, source_name, checksum?)` triple yielded by a [`MediaReader`].
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub frame_id: i64,
    pub body: FrameBody,
    /// On-disk or remote origin name: the video file's path for video
    /// frames, or the image's relative/object path otherwise.
    pub source_name: String,
    /// Per-file checksum from the manifest, when one was available to
    /// compare the download against (cloud backend only).
    pub checksum: Option<String>,
}

/// Lazy, ascending-ordered raw frame sequence over one of the three media
/// backends. `frame_ids` must be non-decreasing; implementations check this
/// with [`require_non_decreasing`] before doing any work.
pub trait MediaReader {
    fn iterate<'a>(
        &'a self,
        frame_ids: &[i64],
    ) -> CoreResult<Box<dyn Iterator<Item = CoreResult<RawFrame>> + 'a>>;
}

/// Rejects a non-monotonic `frame_ids` request up front, matching the
/// `InvalidArgument` case named in the error taxonomy for exactly this input.
pub fn require_non_decreasing(frame_ids: &[i64]) -> CoreResult<()> {
    if frame_ids.windows(2).all(|w| w[0] <= w[1]) {
        Ok(())
    } else {
        Err(mc_error::CoreError::invalid_argument(format!(
            "frame_ids must be non-decreasing, got {frame_ids:?}"
        )))
    }
}

/// Picks the concrete backend for `task.storage` and returns it behind a
/// trait object, so callers (`mc_cache`'s producers) never match on storage
/// kind themselves.
pub fn make_media_reader(
    task: &Task,
    image_repository: std::sync::Arc<dyn mc_types::ImageRepository>,
    blob_store: Option<std::sync::Arc<dyn mc_types::BlobStore>>,
    manifest: Option<std::sync::Arc<dyn mc_manifest::ManifestReader>>,
    ffmpeg_path: Option<String>,
) -> CoreResult<Box<dyn MediaReader + Send + Sync>> {
    match task.storage {
        StorageBackend::Cloud => {
            let blob_store = blob_store.ok_or_else(|| {
                mc_error::CoreError::invalid_state("cloud task requires a blob store")
            })?;
            let manifest = manifest.ok_or_else(|| {
                mc_error::CoreError::not_found("cloud task requires an image manifest")
            })?;
            Ok(Box::new(CloudImageReader::new(blob_store, manifest)))
        }
        StorageBackend::Local | StorageBackend::Share => {
            if let Some(video) = &task.video {
                Ok(Box::new(VideoReader::new(
                    video.clone(),
                    task.manifest_path.clone(),
                    ffmpeg_path,
                )))
            } else {
                Ok(Box::new(LocalImageReader::new(
                    task.id,
                    image_repository,
                )))
            }
        }
    }
}

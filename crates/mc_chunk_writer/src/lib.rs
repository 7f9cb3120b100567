//! Serializes an ordered frame iterator into one of two on-wire containers:
//! an MP4-like video container or a ZIP archive.
//!
//! Four concrete writers implement [`ChunkWriter`], selected by
//! [`select_writer`] from the `(quality, chunk_type)` pair — never by a class
//! hierarchy, since the set of combinations is fixed and small (spec §9
//! "pick the concrete writer by `(quality, chunk_type)` table lookup").

mod archive;
mod video;

pub use archive::{ArchiveCompressedWriter, ArchiveOriginalWriter, ArchiveSubMode};
pub use video::{VideoCompressedWriter, VideoOriginalWriter};

use mc_error::{CoreError, CoreResult};
use mc_media_reader::{DecodedFrame, FrameBody, RawFrame};
use mc_types::{ChunkType, Quality};

/// One frame handed to a [`ChunkWriter`]: the raw frame plus the ordinal
/// position it occupies within the chunk (writers that need to name files,
/// like the archive writers, use this instead of re-deriving it).
pub struct WriterFrame {
    pub position: usize,
    pub raw: RawFrame,
}

/// Non-decode options every writer accepts, regardless of container kind.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// 3D tasks disable decoding entirely: point-cloud blobs are stored
    /// byte-for-byte regardless of the nominal writer selected.
    pub dimension: mc_types::Dimension,
    /// `1..=100`, used by compressed writers only.
    pub image_quality: u8,
}

/// Serializes an ordered frame sequence into a single chunk artifact.
///
/// Implementations consume `frames` exactly once, in order, appending to
/// `sink`. On any error mid-stream the sink is left in an undefined state —
/// callers must discard it, never resume from it.
pub trait ChunkWriter {
    fn write(
        &self,
        frames: &mut dyn Iterator<Item = WriterFrame>,
        sink: &mut dyn std::io::Write,
        options: &WriterOptions,
    ) -> CoreResult<()>;

    fn mime(&self) -> &'static str;
}

/// Writer-matrix table lookup (spec §4.2): `(quality, chunk_type) -> writer`.
pub fn select_writer(quality: Quality, chunk_type: ChunkType) -> Box<dyn ChunkWriter> {
    match (quality, chunk_type) {
        (Quality::Original, ChunkType::Video) => Box::new(VideoOriginalWriter),
        (Quality::Original, ChunkType::Imageset) => {
            Box::new(ArchiveOriginalWriter)
        }
        (Quality::Compressed, ChunkType::Video) => Box::new(VideoCompressedWriter),
        (Quality::Compressed, ChunkType::Imageset) => {
            Box::new(ArchiveCompressedWriter::new(ArchiveSubMode::CompressFrames))
        }
    }
}

/// Normalizes either frame body kind to decoded BGR pixels, so writers that
/// need raw pixels (the video writers) can still accept an already-encoded
/// image — the case when a task-level chunk joins frames pulled back out of
/// more than one segment's own chunk, which hands back whatever body kind
/// that segment's media happens to produce.
pub(crate) fn decode_to_bgr(raw: &RawFrame) -> CoreResult<DecodedFrame> {
    match &raw.body {
        FrameBody::Video(decoded) => Ok(decoded.clone()),
        FrameBody::EncodedImage(bytes) => {
            let image = image::load_from_memory(bytes)
                .map_err(|e| CoreError::MediaDecodeError {
                    source_name: raw.source_name.clone(),
                    message: e.to_string(),
                })?
                .into_rgb8();
            let (width, height) = image.dimensions();
            let mut bgr = vec![0u8; (width * height * 3) as usize];
            for (i, pixel) in image.pixels().enumerate() {
                bgr[i * 3] = pixel[2];
                bgr[i * 3 + 1] = pixel[1];
                bgr[i * 3 + 2] = pixel[0];
            }
            Ok(DecodedFrame { width, height, bgr })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_produces_expected_mime() {
        assert_eq!(
            select_writer(Quality::Original, ChunkType::Video).mime(),
            "video/mp4"
        );
        assert_eq!(
            select_writer(Quality::Compressed, ChunkType::Video).mime(),
            "video/mp4"
        );
        assert_eq!(
            select_writer(Quality::Original, ChunkType::Imageset).mime(),
            "application/zip"
        );
        assert_eq!(
            select_writer(Quality::Compressed, ChunkType::Imageset).mime(),
            "application/zip"
        );
    }
}

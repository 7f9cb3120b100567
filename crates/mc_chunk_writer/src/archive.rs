use std::io::Write;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use mc_error::{CoreError, CoreResult};
use mc_media_reader::FrameBody;
use mc_types::Dimension;

use crate::{ChunkWriter, WriterFrame, WriterOptions};

/// Stores each frame's bytes unmodified in a ZIP archive — the lossless tier
/// for `IMAGESET` chunks. Point-cloud blobs (3D tasks) pass through exactly
/// the same way, since this writer never decodes pixels.
pub struct ArchiveOriginalWriter;

impl ChunkWriter for ArchiveOriginalWriter {
    fn write(
        &self,
        frames: &mut dyn Iterator<Item = WriterFrame>,
        sink: &mut dyn Write,
        _options: &WriterOptions,
    ) -> CoreResult<()> {
        write_archive(frames, sink, |frame, zip| {
            let bytes = encoded_bytes(&frame.raw)?;
            zip.start_file(entry_name(&frame), SimpleFileOptions::default())
                .map_err(zip_error)?;
            zip.write_all(&bytes).map_err(CoreError::from)?;
            Ok(())
        })
    }

    fn mime(&self) -> &'static str {
        "application/zip"
    }
}

/// The archive-compressed writer's two documented sub-modes (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveSubMode {
    /// Re-encode each frame as JPEG at `Task.image_quality`.
    CompressFrames,
    /// Store already-encoded bytes as-is, at archive-level deflate 1 — used
    /// for placeholders, which are already the right bytes.
    StoreOnly,
}

/// Re-encodes (or passes through) frames into a ZIP archive — the
/// compressed tier for `IMAGESET` chunks.
pub struct ArchiveCompressedWriter {
    sub_mode: ArchiveSubMode,
    /// Archive-level deflate level, independent of the per-frame sub-mode —
    /// CVAT's masked-range chunk uses `compress_frames=true` (the default)
    /// together with `zip_compress_level=1` since it expects many repeated
    /// placeholder frames.
    zip_level: i64,
}

impl ArchiveCompressedWriter {
    pub fn new(sub_mode: ArchiveSubMode) -> Self {
        Self {
            sub_mode,
            zip_level: 6,
        }
    }

    pub fn with_zip_level(mut self, level: i64) -> Self {
        self.zip_level = level;
        self
    }
}

impl ChunkWriter for ArchiveCompressedWriter {
    fn write(
        &self,
        frames: &mut dyn Iterator<Item = WriterFrame>,
        sink: &mut dyn Write,
        options: &WriterOptions,
    ) -> CoreResult<()> {
        // 3D tasks disable decoding outright, same as the original writer.
        let store_only =
            self.sub_mode == ArchiveSubMode::StoreOnly || options.dimension == Dimension::Dim3D;
        let opts = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.zip_level));

        write_archive(frames, sink, |frame, zip| {
            let name = entry_name(&frame);

            if store_only {
                let bytes = encoded_bytes(&frame.raw)?;
                zip.start_file(name, opts).map_err(zip_error)?;
                zip.write_all(&bytes).map_err(CoreError::from)?;
            } else {
                let recompressed = frame_to_jpeg(&frame.raw, options.image_quality)?;
                zip.start_file(name, opts).map_err(zip_error)?;
                zip.write_all(&recompressed).map_err(CoreError::from)?;
            }
            Ok(())
        })
    }

    fn mime(&self) -> &'static str {
        "application/zip"
    }
}

/// The `zip` crate needs a seekable sink to backpatch the central directory,
/// but [`ChunkWriter::write`] only promises a plain [`Write`]. We build the
/// archive in memory and copy it to `sink` once finished, same tradeoff
/// CVAT's in-memory `io.BytesIO()` archive buffer makes.
fn write_archive(
    frames: &mut dyn Iterator<Item = WriterFrame>,
    sink: &mut dyn Write,
    mut put: impl FnMut(WriterFrame, &mut ZipWriter<std::io::Cursor<Vec<u8>>>) -> CoreResult<()>,
) -> CoreResult<()> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for frame in frames {
        put(frame, &mut zip)?;
    }
    let buffer = zip.finish().map_err(zip_error)?.into_inner();
    sink.write_all(&buffer).map_err(CoreError::from)?;
    Ok(())
}

fn entry_name(frame: &WriterFrame) -> String {
    if frame.raw.source_name.is_empty() {
        format!("frame_{:06}", frame.position)
    } else {
        std::path::Path::new(&frame.raw.source_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("frame_{:06}", frame.position))
    }
}

fn encoded_bytes(raw: &mc_media_reader::RawFrame) -> CoreResult<Vec<u8>> {
    match &raw.body {
        FrameBody::EncodedImage(bytes) => Ok(bytes.clone()),
        FrameBody::Video(_) => Err(CoreError::ChunkWriteError(
            "archive writer received a decoded video frame, not encoded image bytes".to_owned(),
        )),
    }
}

/// Normalizes either body kind to pixels, then re-encodes as JPEG at
/// `quality` — the `compress_frames` sub-mode, which applies regardless of
/// whether the source was already an encoded image or a decoded video frame
/// (masked-range/`SPECIFIC_FRAMES` chunks over a video-backed task mix both).
fn frame_to_jpeg(raw: &mc_media_reader::RawFrame, quality: u8) -> CoreResult<Vec<u8>> {
    let image = match &raw.body {
        FrameBody::EncodedImage(bytes) => image::load_from_memory(bytes)
            .map_err(|e| CoreError::ChunkWriteError(format!("failed to decode frame: {e}")))?,
        FrameBody::Video(decoded) => {
            let buffer = image::ImageBuffer::from_fn(decoded.width, decoded.height, |x, y| {
                let i = ((y * decoded.width + x) * 3) as usize;
                image::Rgb([decoded.bgr[i + 2], decoded.bgr[i + 1], decoded.bgr[i]])
            });
            image::DynamicImage::ImageRgb8(buffer)
        }
    };

    let mut out = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder
        .encode_image(&image)
        .map_err(|e| CoreError::ChunkWriteError(format!("failed to re-encode frame: {e}")))?;
    Ok(out)
}

fn zip_error(err: impl std::fmt::Display) -> CoreError {
    CoreError::ChunkWriteError(format!("zip error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_media_reader::RawFrame;

    fn image_frame(position: usize, name: &str) -> WriterFrame {
        let mut bytes = Vec::new();
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .unwrap();

        WriterFrame {
            position,
            raw: RawFrame {
                frame_id: position as i64,
                body: FrameBody::EncodedImage(bytes),
                source_name: name.to_owned(),
                checksum: None,
            },
        }
    }

    #[test]
    fn original_writer_preserves_bytes_in_a_zip() {
        let frames = vec![image_frame(0, "a.jpg"), image_frame(1, "b.jpg")];
        let mut sink = Vec::new();
        ArchiveOriginalWriter
            .write(
                &mut frames.into_iter(),
                &mut sink,
                &WriterOptions {
                    dimension: Dimension::Dim2D,
                    image_quality: 70,
                },
            )
            .unwrap();

        let archive = zip::ZipArchive::new(std::io::Cursor::new(sink)).unwrap();
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn compressed_writer_recompresses_each_frame() {
        let frames = vec![image_frame(0, "a.jpg")];
        let mut sink = Vec::new();
        ArchiveCompressedWriter::new(ArchiveSubMode::CompressFrames)
            .write(
                &mut frames.into_iter(),
                &mut sink,
                &WriterOptions {
                    dimension: Dimension::Dim2D,
                    image_quality: 50,
                },
            )
            .unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(sink)).unwrap();
        assert_eq!(archive.len(), 1);
        let mut file = archive.by_index(0).unwrap();
        let mut out = Vec::new();
        std::io::copy(&mut file, &mut out).unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn compressed_writer_accepts_decoded_video_frames_for_masked_range_chunks() {
        use mc_media_reader::{DecodedFrame, RawFrame};

        let frames = vec![WriterFrame {
            position: 0,
            raw: RawFrame {
                frame_id: 0,
                body: FrameBody::Video(DecodedFrame {
                    width: 4,
                    height: 4,
                    bgr: vec![1u8; 4 * 4 * 3],
                }),
                source_name: "video.mp4".to_owned(),
                checksum: None,
            },
        }];
        let mut sink = Vec::new();
        ArchiveCompressedWriter::new(ArchiveSubMode::CompressFrames)
            .write(
                &mut frames.into_iter(),
                &mut sink,
                &WriterOptions {
                    dimension: Dimension::Dim2D,
                    image_quality: 70,
                },
            )
            .unwrap();

        let archive = zip::ZipArchive::new(std::io::Cursor::new(sink)).unwrap();
        assert_eq!(archive.len(), 1);
    }
}

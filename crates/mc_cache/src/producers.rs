//! The per-key cache producers: what actually builds the bytes behind each
//! cache key on a miss. Direct port of `cache.py`'s private `_prepare_*` and
//! `prepare_*` functions — the writer/media-reader plumbing lives in
//! `mc_chunk_writer`/`mc_media_reader`, this module only wires them together
//! per key kind.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use mc_chunk_writer::{ArchiveCompressedWriter, ArchiveSubMode, ChunkWriter, WriterFrame, WriterOptions};
use mc_error::{CoreError, CoreResult};
use mc_media_reader::{DecodedFrame, FrameBody, RawFrame};
use mc_types::{
    BlobStore, CloudStorageBinding, Dimension, ImageRepository, Quality, Segment, SegmentKind,
    Task,
};

use crate::DataWithMime;

const PREVIEW_DIM: u32 = 256;
const PREVIEW_QUALITY: u8 = 75;

/// The collaborators a producer needs to read raw media, bundled so callers
/// don't have to thread four optional arguments through every producer
/// function (spec §6's `ImageRepository`/`BlobStore`/`ManifestReader` plus the
/// local `ffmpeg` binary path `mc_media_reader::VideoReader` shells out to).
#[derive(Clone)]
pub struct MediaSources {
    pub image_repository: Arc<dyn ImageRepository>,
    pub blob_store: Option<Arc<dyn BlobStore>>,
    pub manifest: Option<Arc<dyn mc_manifest::ManifestReader>>,
    pub ffmpeg_path: Option<String>,
}

impl MediaSources {
    fn media_reader(&self, task: &Task) -> CoreResult<Box<dyn mc_media_reader::MediaReader + Send + Sync>> {
        mc_media_reader::make_media_reader(
            task,
            self.image_repository.clone(),
            self.blob_store.clone(),
            self.manifest.clone(),
            self.ffmpeg_path.clone(),
        )
    }
}

/// Runs an already-selected writer over a raw frame sequence and returns the
/// finished chunk bytes. Shared by every producer that writes a whole chunk
/// (segment, task, and — with its own writer override — the masked-range
/// producer below).
pub fn prepare_chunk(
    frames: impl Iterator<Item = CoreResult<RawFrame>>,
    task: &Task,
    quality: Quality,
) -> CoreResult<DataWithMime> {
    let chunk_type = match quality {
        Quality::Original => task.original_chunk_type,
        Quality::Compressed => task.compressed_chunk_type,
    };
    let image_quality = match quality {
        Quality::Original => 100,
        Quality::Compressed => task.image_quality,
    };

    let writer = mc_chunk_writer::select_writer(quality, chunk_type);
    let writer_frames = frames
        .enumerate()
        .map(|(position, raw)| raw.map(|raw| WriterFrame { position, raw }))
        .collect::<CoreResult<Vec<_>>>()?;

    let mut sink = Vec::new();
    writer.write(
        &mut writer_frames.into_iter(),
        &mut sink,
        &WriterOptions {
            dimension: task.dimension,
            image_quality,
        },
    )?;
    Ok((sink, writer.mime().to_owned()))
}

/// `get_segment_chunk`'s producer: dispatches on the segment's addressing
/// scheme, same as `prepare_segment_chunk` in the original.
pub fn prepare_segment_chunk(
    task: &Task,
    segment: &Segment,
    chunk_number: i64,
    quality: Quality,
    sources: &MediaSources,
) -> CoreResult<DataWithMime> {
    match segment.kind {
        SegmentKind::Range => prepare_range_segment_chunk(task, segment, chunk_number, quality, sources),
        SegmentKind::SpecificFrames => {
            prepare_masked_range_segment_chunk(task, segment, chunk_number, quality, sources)
        }
    }
}

fn prepare_range_segment_chunk(
    task: &Task,
    segment: &Segment,
    chunk_number: i64,
    quality: Quality,
    sources: &MediaSources,
) -> CoreResult<DataWithMime> {
    let frame_ids = segment.chunk_frame_ids(chunk_number, task.chunk_size);
    let reader = sources.media_reader(task)?;
    let frames = reader.iterate(&frame_ids)?;
    prepare_chunk(frames, task, quality)
}

/// `prepare_masked_range_segment_chunk`'s producer: a `SPECIFIC_FRAMES`
/// segment's job chunk, built one slot at a time over the nominal chunk
/// range — real frames where the segment owns the slot, a placeholder
/// elsewhere. Written `store_only` at `zip_compress_level=1` regardless of
/// `quality`, matching the original, which ignores its own `quality` keyword
/// argument here: real frames are JPEG-encoded up front (at
/// `task.image_quality`) so the archive itself never needs to re-encode.
pub fn prepare_masked_range_segment_chunk(
    task: &Task,
    segment: &Segment,
    chunk_number: i64,
    _quality: Quality,
    sources: &MediaSources,
) -> CoreResult<DataWithMime> {
    let step = task.frame_step;
    let first = task.start_frame + chunk_number * task.chunk_size * step;

    let mut slot_frame_ids = Vec::with_capacity(task.chunk_size as usize);
    let mut frame_idx = first;
    while (slot_frame_ids.len() as i64) < task.chunk_size && frame_idx <= task.stop_frame {
        slot_frame_ids.push(frame_idx);
        frame_idx += step;
    }

    let real_ids: Vec<i64> = slot_frame_ids
        .iter()
        .copied()
        .filter(|id| segment.frame_set.contains(id))
        .collect();

    let reader = sources.media_reader(task)?;
    let mut real_frames = reader.iterate(&real_ids)?;

    let mut writer_frames = Vec::with_capacity(slot_frame_ids.len());
    for (position, id) in slot_frame_ids.iter().enumerate() {
        let raw = if segment.frame_set.contains(id) {
            let raw = real_frames.next().ok_or_else(|| {
                CoreError::storage("media reader yielded fewer frames than requested")
            })??;
            restore_native_size_and_encode(raw, task.video.as_ref(), task.image_quality)?
        } else {
            placeholder_raw_frame(*id)?
        };
        writer_frames.push(WriterFrame { position, raw });
    }

    let writer = ArchiveCompressedWriter::new(ArchiveSubMode::StoreOnly).with_zip_level(1);
    let mut sink = Vec::new();
    writer.write(
        &mut writer_frames.into_iter(),
        &mut sink,
        &WriterOptions {
            dimension: task.dimension,
            image_quality: task.image_quality,
        },
    )?;
    Ok((sink, writer.mime().to_owned()))
}

/// Decoded video frames can come back at a different resolution than the
/// task's declared video dimensions (manifest-accelerated seeks decode only
/// the requested packet, which can predate a mid-stream resolution change);
/// restore the original size, then JPEG-encode so a `store_only` archive
/// writer can take the bytes as-is. Already-encoded images pass through
/// untouched.
fn restore_native_size_and_encode(
    raw: RawFrame,
    video: Option<&mc_types::VideoDescriptor>,
    quality: u8,
) -> CoreResult<RawFrame> {
    let RawFrame {
        frame_id,
        body,
        source_name,
        checksum,
    } = raw;

    let body = match body {
        FrameBody::Video(decoded) => {
            let decoded = match video {
                Some(video) if decoded.width != video.width || decoded.height != video.height => {
                    resize_decoded_frame(decoded, video.width, video.height)
                }
                _ => decoded,
            };
            FrameBody::EncodedImage(encode_decoded_frame_as_jpeg(&decoded, quality)?)
        }
        other => other,
    };

    Ok(RawFrame {
        frame_id,
        body,
        source_name,
        checksum,
    })
}

fn encode_decoded_frame_as_jpeg(decoded: &DecodedFrame, quality: u8) -> CoreResult<Vec<u8>> {
    let buffer = image::ImageBuffer::from_fn(decoded.width, decoded.height, |x, y| {
        let i = ((y * decoded.width + x) * 3) as usize;
        image::Rgb([decoded.bgr[i + 2], decoded.bgr[i + 1], decoded.bgr[i]])
    });
    let image = image::DynamicImage::ImageRgb8(buffer);

    let mut bytes = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder
        .encode_image(&image)
        .map_err(|e| CoreError::ChunkWriteError(format!("failed to encode frame: {e}")))?;
    Ok(bytes)
}

fn resize_decoded_frame(decoded: DecodedFrame, width: u32, height: u32) -> DecodedFrame {
    let buffer = image::ImageBuffer::from_fn(decoded.width, decoded.height, |x, y| {
        let i = ((y * decoded.width + x) * 3) as usize;
        image::Rgb([decoded.bgr[i + 2], decoded.bgr[i + 1], decoded.bgr[i]])
    });
    let resized = image::imageops::resize(&buffer, width, height, image::imageops::FilterType::Triangle);

    let mut bgr = vec![0u8; (width * height * 3) as usize];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let i = ((y * width + x) * 3) as usize;
        bgr[i] = pixel[2];
        bgr[i + 1] = pixel[1];
        bgr[i + 2] = pixel[0];
    }
    DecodedFrame { width, height, bgr }
}

fn placeholder_raw_frame(frame_id: i64) -> CoreResult<RawFrame> {
    Ok(RawFrame {
        frame_id,
        body: FrameBody::EncodedImage(placeholder_jpeg_bytes()?),
        source_name: format!("placeholder_{frame_id:06}.jpg"),
        checksum: None,
    })
}

/// A 1x1 black JPEG standing in for a slot a `SPECIFIC_FRAMES` segment
/// doesn't own within its nominal chunk range.
fn placeholder_jpeg_bytes() -> CoreResult<Vec<u8>> {
    let image = image::RgbImage::from_pixel(1, 1, image::Rgb([0, 0, 0]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .map_err(|e| CoreError::ChunkWriteError(format!("failed to encode placeholder frame: {e}")))?;
    Ok(bytes)
}

/// `get_or_set_segment_preview`'s producer: a 256x256 JPEG thumbnail of the
/// segment's first frame, EXIF-orientation-normalized first. 3D tasks never
/// decode pixels; they get a flat placeholder image instead.
pub fn prepare_segment_preview(
    task: &Task,
    segment: &Segment,
    sources: &MediaSources,
) -> CoreResult<DataWithMime> {
    if task.dimension == Dimension::Dim3D {
        return Ok((placeholder_preview_bytes()?, "image/jpeg".to_owned()));
    }

    let frame_id = segment.lowest_frame().ok_or_else(|| {
        CoreError::not_found(format!("segment {} has no frames to preview", segment.id))
    })?;

    let reader = sources.media_reader(task)?;
    let mut frames = reader.iterate(&[frame_id])?;
    let raw = frames
        .next()
        .ok_or_else(|| CoreError::not_found(format!("frame {frame_id} not found")))??;

    let image = decode_to_image(&raw.body)?;
    let image = match &raw.body {
        FrameBody::EncodedImage(bytes) => normalize_orientation(image, bytes),
        FrameBody::Video(_) => image,
    };
    let thumbnail = image.thumbnail(PREVIEW_DIM, PREVIEW_DIM);

    let mut bytes = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, PREVIEW_QUALITY);
    encoder
        .encode_image(&thumbnail)
        .map_err(|e| CoreError::ChunkWriteError(format!("failed to encode preview: {e}")))?;

    Ok((bytes, "image/jpeg".to_owned()))
}

fn decode_to_image(body: &FrameBody) -> CoreResult<image::DynamicImage> {
    match body {
        FrameBody::EncodedImage(bytes) => image::load_from_memory(bytes).map_err(|e| CoreError::MediaDecodeError {
            source_name: "preview source".to_owned(),
            message: e.to_string(),
        }),
        FrameBody::Video(decoded) => {
            let buffer = image::ImageBuffer::from_fn(decoded.width, decoded.height, |x, y| {
                let i = ((y * decoded.width + x) * 3) as usize;
                image::Rgb([decoded.bgr[i + 2], decoded.bgr[i + 1], decoded.bgr[i]])
            });
            Ok(image::DynamicImage::ImageRgb8(buffer))
        }
    }
}

/// Applies the EXIF `Orientation` tag the same way `ImageOps.exif_transpose`
/// does, so rotated phone photos don't preview sideways. Frames without a
/// readable EXIF block (or a decoded video frame, which never has one) pass
/// through unchanged.
fn normalize_orientation(image: image::DynamicImage, raw_bytes: &[u8]) -> image::DynamicImage {
    let Ok(exif) = rexif::parse_buffer(raw_bytes) else {
        return image;
    };

    let orientation = exif
        .entries
        .iter()
        .find(|entry| entry.tag == rexif::ExifTag::Orientation)
        .and_then(|entry| match &entry.value {
            rexif::TagValue::U16(values) => values.first().map(|v| *v as i64),
            _ => None,
        })
        .unwrap_or(1);

    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

fn placeholder_preview_bytes() -> CoreResult<Vec<u8>> {
    let image = image::RgbImage::from_pixel(PREVIEW_DIM, PREVIEW_DIM, image::Rgb([128, 128, 128]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .map_err(|e| CoreError::ChunkWriteError(format!("failed to encode placeholder preview: {e}")))?;
    Ok(bytes)
}

/// `get_or_set_cloud_preview`'s producer: the first manifest entry's object,
/// cached to `storage_dir` and only re-downloaded once the remote object's
/// `last_modified` moves past the cached copy's mtime.
pub fn prepare_cloud_preview(
    binding: &CloudStorageBinding,
    blob_store: Arc<dyn BlobStore>,
    storage_dir: &Path,
) -> CoreResult<DataWithMime> {
    let manifest_descriptor = binding
        .manifests
        .first()
        .ok_or_else(|| CoreError::not_found(format!("cloud storage {} has no manifest", binding.id)))?;
    let manifest_path = storage_dir.join(&manifest_descriptor.filename);
    let manifest = mc_manifest::FileImageManifestReader::open(&manifest_path)?;
    let first_entry = manifest
        .at(0)
        .ok_or_else(|| CoreError::not_found(format!("cloud storage {} manifest is empty", binding.id)))?;
    let object_name = format!("{}{}", first_entry.name, first_entry.extension);

    let cached_path = storage_dir.join(format!("preview_{object_name}"));
    let remote_mtime = blob_store.last_modified(&object_name)?;
    let is_fresh = std::fs::metadata(&cached_path)
        .and_then(|metadata| metadata.modified())
        .map(|local_mtime| local_mtime >= remote_mtime)
        .unwrap_or(false);

    let bytes = if is_fresh {
        std::fs::read(&cached_path)?
    } else {
        let bytes = blob_store.download_one(&object_name)?;
        std::fs::write(&cached_path, &bytes)?;
        bytes
    };

    Ok((bytes, guess_mime_from_extension(&first_entry.extension).to_owned()))
}

fn guess_mime_from_extension(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// `prepare_context_images`' producer: each related file re-encoded as JPEG
/// and bundled into a ZIP, same as the per-key chunk archives.
pub fn build_context_image_archive(paths: &[PathBuf]) -> CoreResult<DataWithMime> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();

    for (index, path) in paths.iter().enumerate() {
        let bytes = std::fs::read(path)?;
        let image = image::load_from_memory(&bytes).map_err(|e| CoreError::MediaDecodeError {
            source_name: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut encoded = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut encoded), image::ImageFormat::Jpeg)
            .map_err(|e| CoreError::ChunkWriteError(format!("failed to encode context image: {e}")))?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("context_{index}"));
        zip.start_file(format!("{index:03}_{stem}.jpg"), opts)
            .map_err(zip_error)?;
        zip.write_all(&encoded).map_err(CoreError::from)?;
    }

    let buffer = zip.finish().map_err(zip_error)?.into_inner();
    Ok((buffer, "application/zip".to_owned()))
}

fn zip_error(err: impl std::fmt::Display) -> CoreError {
    CoreError::ChunkWriteError(format!("zip error: {err}"))
}

//! A single chunk's contents, decoded once and indexable by its in-chunk
//! offset — the Rust equivalent of `RandomAccessIterator` wrapped around
//! either a `VideoReader` or a `ZipReader` in the original.

use std::io::Write as _;

use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;

use mc_error::{CoreError, CoreResult};
use mc_media_reader::{DecodedFrame, FrameBody};
use mc_types::ChunkType;

/// A chunk, fully decoded into memory: either every frame's pixels (video
/// chunks) or every archive entry's raw bytes (image-set chunks), in order.
pub enum RandomAccessChunk {
    Video(Vec<DecodedFrame>),
    Archive(Vec<(String, Vec<u8>)>),
}

impl RandomAccessChunk {
    pub fn open(bytes: &[u8], chunk_type: ChunkType, ffmpeg_path: Option<&str>) -> CoreResult<Self> {
        match chunk_type {
            ChunkType::Video => Ok(Self::Video(decode_video_chunk(bytes, ffmpeg_path)?)),
            ChunkType::Imageset => Ok(Self::Archive(read_archive_entries(bytes)?)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Video(frames) => frames.len(),
            Self::Archive(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The frame at `offset` within the chunk, plus a name to derive a MIME
    /// type or archive entry name from.
    pub fn frame_at(&self, offset: usize) -> CoreResult<(FrameBody, String)> {
        match self {
            Self::Video(frames) => {
                let frame = frames.get(offset).cloned().ok_or_else(|| {
                    CoreError::not_found(format!("chunk frame offset {offset} out of range"))
                })?;
                Ok((FrameBody::Video(frame), format!("frame_{offset:06}.png")))
            }
            Self::Archive(entries) => {
                let (name, bytes) = entries.get(offset).cloned().ok_or_else(|| {
                    CoreError::not_found(format!("chunk frame offset {offset} out of range"))
                })?;
                Ok((FrameBody::EncodedImage(bytes), name))
            }
        }
    }
}

/// Writes the chunk's MP4 bytes to a temp file and decodes every frame in
/// one linear `ffmpeg` pass — a whole resident chunk is small enough (one
/// task's `chunk_size`) that there's no point in a manifest here.
fn decode_video_chunk(bytes: &[u8], ffmpeg_path: Option<&str>) -> CoreResult<Vec<DecodedFrame>> {
    let mut tmp = tempfile::NamedTempFile::new().map_err(CoreError::from)?;
    tmp.write_all(bytes).map_err(CoreError::from)?;
    tmp.flush().map_err(CoreError::from)?;

    let mut cmd = match ffmpeg_path {
        Some(path) => FfmpegCommand::new_with_path(path),
        None => FfmpegCommand::new(),
    };
    cmd.hide_banner()
        .input(tmp.path().to_string_lossy())
        .rawvideo();

    let decode_error = |message: String| CoreError::MediaDecodeError {
        source_name: "chunk".to_owned(),
        message,
    };

    let mut child = cmd
        .spawn()
        .map_err(|e| decode_error(format!("failed to spawn ffmpeg: {e}")))?;

    let mut frames = Vec::new();
    for event in child
        .iter()
        .map_err(|e| decode_error(format!("ffmpeg event stream failed: {e}")))?
    {
        if let FfmpegEvent::OutputFrame(frame) = event {
            frames.push(DecodedFrame {
                width: frame.width,
                height: frame.height,
                bgr: frame.data,
            });
        }
    }
    Ok(frames)
}

/// Reads every entry out of a ZIP chunk, in archive order — the same order
/// the writer put them in, i.e. ascending in-chunk position.
fn read_archive_entries(bytes: &[u8]) -> CoreResult<Vec<(String, Vec<u8>)>> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| CoreError::storage(format!("malformed chunk archive: {e}")))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| CoreError::storage(format!("malformed chunk archive entry {i}: {e}")))?;
        let name = file.name().to_owned();
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut data).map_err(CoreError::from)?;
        entries.push((name, data));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, zip::write::SimpleFileOptions::default()).unwrap();
            std::io::Write::write_all(&mut writer, data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn archive_chunk_reads_entries_in_order() {
        let bytes = zip_bytes(&[("frame_000000.jpg", b"first"), ("frame_000001.jpg", b"second")]);
        let chunk = RandomAccessChunk::open(&bytes, ChunkType::Imageset, None).unwrap();
        assert_eq!(chunk.len(), 2);

        let (body, name) = chunk.frame_at(0).unwrap();
        assert_eq!(name, "frame_000000.jpg");
        match body {
            FrameBody::EncodedImage(data) => assert_eq!(data, b"first"),
            FrameBody::Video(_) => panic!("expected an encoded-image body"),
        }

        let (body, name) = chunk.frame_at(1).unwrap();
        assert_eq!(name, "frame_000001.jpg");
        match body {
            FrameBody::EncodedImage(data) => assert_eq!(data, b"second"),
            FrameBody::Video(_) => panic!("expected an encoded-image body"),
        }
    }

    #[test]
    fn archive_chunk_out_of_range_offset_is_not_found() {
        let bytes = zip_bytes(&[("frame_000000.jpg", b"only")]);
        let chunk = RandomAccessChunk::open(&bytes, ChunkType::Imageset, None).unwrap();
        assert!(matches!(chunk.frame_at(1), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn malformed_archive_is_a_storage_error() {
        let err = RandomAccessChunk::open(b"not a zip file", ChunkType::Imageset, None).unwrap_err();
        assert!(matches!(err, CoreError::StorageError(_)));
    }
}

//! The two ways a quality tier's chunks reach a segment: already-produced
//! bytes pulled out of the cache, or a chunk file precomputed to disk.
//!
//! Direct port of `frame_provider.py`'s `_ChunkLoader` family: one trait for
//! "give me this chunk's bytes", two concrete sources, and a decode-once
//! wrapper that keeps at most one chunk resident per quality tier.

use std::path::PathBuf;

use mc_cache::DataWithMime;
use mc_error::{CoreError, CoreResult};
use mc_types::ChunkType;

use crate::chunk::RandomAccessChunk;

/// Produces one chunk's raw bytes on demand; doesn't know how to decode them.
pub trait ChunkLoader: Send + Sync {
    fn read_chunk_bytes(&self, chunk_number: i64) -> CoreResult<DataWithMime>;

    /// Which container family this tier's chunks are encoded as — needed by
    /// [`RandomAccessChunk::open`] to pick a decoder.
    fn chunk_type(&self) -> ChunkType;
}

/// Reads a precomputed chunk file off disk — the `StorageMethod::FileSystem` case.
pub struct FileChunkLoader<F> {
    chunk_type: ChunkType,
    path_of: F,
}

impl<F> FileChunkLoader<F>
where
    F: Fn(i64) -> CoreResult<PathBuf> + Send + Sync,
{
    pub fn new(chunk_type: ChunkType, path_of: F) -> Self {
        Self { chunk_type, path_of }
    }
}

impl<F> ChunkLoader for FileChunkLoader<F>
where
    F: Fn(i64) -> CoreResult<PathBuf> + Send + Sync,
{
    fn read_chunk_bytes(&self, chunk_number: i64) -> CoreResult<DataWithMime> {
        let path = (self.path_of)(chunk_number)?;
        let bytes = std::fs::read(&path).map_err(CoreError::from)?;
        let mime = mime_guess2::from_path(&path)
            .first_or_octet_stream()
            .to_string();
        Ok((bytes, mime))
    }

    fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }
}

/// Pulls a chunk out of the byte cache — the `StorageMethod::Cache` case.
pub struct BufferChunkLoader<F> {
    chunk_type: ChunkType,
    get_chunk: F,
}

impl<F> BufferChunkLoader<F>
where
    F: Fn(i64) -> CoreResult<DataWithMime> + Send + Sync,
{
    pub fn new(chunk_type: ChunkType, get_chunk: F) -> Self {
        Self { chunk_type, get_chunk }
    }
}

impl<F> ChunkLoader for BufferChunkLoader<F>
where
    F: Fn(i64) -> CoreResult<DataWithMime> + Send + Sync,
{
    fn read_chunk_bytes(&self, chunk_number: i64) -> CoreResult<DataWithMime> {
        (self.get_chunk)(chunk_number)
    }

    fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }
}

/// Keeps at most one decoded chunk resident at a time, same as
/// `_ChunkLoader.load`/`unload`: re-decoding only happens when a different
/// chunk number is requested.
pub struct ResidentChunkLoader {
    loader: Box<dyn ChunkLoader>,
    ffmpeg_path: Option<String>,
    resident: Option<(i64, RandomAccessChunk)>,
}

impl ResidentChunkLoader {
    pub fn new(loader: Box<dyn ChunkLoader>, ffmpeg_path: Option<String>) -> Self {
        Self {
            loader,
            ffmpeg_path,
            resident: None,
        }
    }

    /// Raw chunk bytes, bypassing decode — what `get_chunk()` hands back
    /// as-is without ever touching `RandomAccessChunk`.
    pub fn read_chunk_bytes(&self, chunk_number: i64) -> CoreResult<DataWithMime> {
        self.loader.read_chunk_bytes(chunk_number)
    }

    pub fn load(&mut self, chunk_number: i64) -> CoreResult<&RandomAccessChunk> {
        let stale = self.resident.as_ref().map(|(id, _)| *id) != Some(chunk_number);
        if stale {
            let (bytes, _mime) = self.loader.read_chunk_bytes(chunk_number)?;
            let chunk = RandomAccessChunk::open(&bytes, self.loader.chunk_type(), self.ffmpeg_path.as_deref())?;
            self.resident = Some((chunk_number, chunk));
        }
        Ok(&self.resident.as_ref().expect("just populated above").1)
    }

    pub fn unload(&mut self) {
        self.resident = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    struct CountingLoader {
        reads: Arc<AtomicU32>,
        archive: Vec<u8>,
    }

    impl ChunkLoader for CountingLoader {
        fn read_chunk_bytes(&self, _chunk_number: i64) -> CoreResult<DataWithMime> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok((self.archive.clone(), "application/zip".to_owned()))
        }

        fn chunk_type(&self) -> ChunkType {
            ChunkType::Imageset
        }
    }

    fn one_entry_archive() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("frame_000000.jpg", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut writer, b"payload").unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn resident_loader_only_decodes_on_chunk_change() {
        let reads = Arc::new(AtomicU32::new(0));
        let loader = CountingLoader {
            reads: reads.clone(),
            archive: one_entry_archive(),
        };
        let mut resident = ResidentChunkLoader::new(Box::new(loader), None);

        resident.load(0).unwrap();
        resident.load(0).unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1, "same chunk number must not re-decode");

        resident.load(1).unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 2, "a different chunk number must re-decode");

        resident.unload();
        resident.load(1).unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 3, "unload() must force the next load() to re-decode");
    }
}

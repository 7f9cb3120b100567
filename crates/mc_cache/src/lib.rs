//! Turns a cache key into bytes: looks up the backend, verifies integrity on
//! hit, and runs the matching producer on miss.
//!
//! Direct port of `cache.py`'s `MediaCache`: the key grammar, the
//! get/get-or-set/delete operations and the per-key producer table are kept
//! function-for-function (see `producers`), only the storage backend and
//! concurrency primitives are idiomatic Rust.

mod backend;
mod producers;

pub use backend::{InMemoryCache, KVCache};
pub use producers::{build_context_image_archive, prepare_chunk, MediaSources};

use std::sync::Arc;

use mc_error::ResultExt;
use mc_types::{CloudStorageBinding, Job, Segment, Task};

/// `(bytes, mime)` — what every cache read/producer hands back.
pub type DataWithMime = (Vec<u8>, String);

/// The single place that turns a cache key into bytes.
pub struct MediaCache {
    backend: Arc<dyn KVCache>,
}

impl MediaCache {
    pub fn new(backend: Arc<dyn KVCache>) -> Self {
        Self { backend }
    }

    pub fn with_in_memory_backend() -> Self {
        Self::new(Arc::new(InMemoryCache::default()))
    }

    fn checksum(bytes: &[u8]) -> u32 {
        crc32fast::hash(bytes)
    }

    /// Lookup only; logs and returns `None` on a malformed entry instead of
    /// propagating (mirrors `_get`'s `pickle.UnpicklingError` handling).
    fn get(&self, key: &str) -> Option<DataWithMime> {
        tracing::debug!("looking up cache key {key}");
        self.backend
            .get(key)
            .warn_on_err_once(format_args!("cache entry {key} unreadable"))
            .flatten()
            .map(|(bytes, mime, _)| (bytes, mime))
    }

    /// Lookup-with-checksum-verification, rebuilding via `produce` on miss or
    /// on a CRC mismatch. Entries whose producer returned empty bytes are
    /// handed back but never written to the backend (spec §4.3 "such
    /// entries are returned but not re-stored").
    fn get_or_set(
        &self,
        key: &str,
        produce: impl FnOnce() -> mc_error::CoreResult<DataWithMime>,
    ) -> mc_error::CoreResult<DataWithMime> {
        let existing = self
            .backend
            .get(key)
            .warn_on_err_once(format_args!("cache entry {key} unreadable"))
            .flatten();
        if let Some((bytes, mime, crc)) = existing {
            if crc == Self::checksum(&bytes) {
                return Ok((bytes, mime));
            }
            tracing::info!("recreating cache item {key} due to checksum mismatch");
        }

        tracing::info!("starting to prepare chunk: key {key}");
        let (bytes, mime) = produce()?;
        tracing::info!("ending to prepare chunk: key {key}");

        if !bytes.is_empty() {
            let crc = Self::checksum(&bytes);
            self.backend.set(key, bytes.clone(), mime.clone(), crc);
        }
        Ok((bytes, mime))
    }

    fn delete(&self, key: &str) {
        self.backend.delete(key);
        tracing::info!("removed chunk from the cache: key {key}");
    }

    // --- key grammar (spec §4.3) -------------------------------------------------

    fn segment_chunk_key(segment_id: i64, chunk_number: i64, quality: mc_types::Quality) -> String {
        format!("segment_{segment_id}_{chunk_number}_{quality}")
    }

    fn task_chunk_key(task_id: i64, chunk_number: i64, quality: mc_types::Quality) -> String {
        format!("task_{task_id}_{chunk_number}_{quality}")
    }

    fn job_chunk_key(job_id: i64, chunk_number: i64, quality: mc_types::Quality) -> String {
        format!("job_{job_id}_{chunk_number}_{quality}")
    }

    fn segment_preview_key(segment_id: i64) -> String {
        format!("segment_preview_{segment_id}")
    }

    fn cloudstorage_preview_key(cloud_storage_id: i64) -> String {
        format!("cloudstorage_preview_{cloud_storage_id}")
    }

    fn context_image_key(data_id: i64, frame_number: i64) -> String {
        format!("context_image_{data_id}_{frame_number}")
    }

    // --- §4.3.1 segment/task/job chunks -------------------------------------------

    pub fn get_segment_chunk(
        &self,
        task: &Task,
        segment: &Segment,
        chunk_number: i64,
        quality: mc_types::Quality,
        sources: &MediaSources,
    ) -> mc_error::CoreResult<DataWithMime> {
        let key = Self::segment_chunk_key(segment.id, chunk_number, quality);
        self.get_or_set(&key, || {
            producers::prepare_segment_chunk(task, segment, chunk_number, quality, sources)
        })
    }

    /// Task chunks are produced out-of-band (the async job queue, out of
    /// scope here); this is a read-only lookup, matching `get_task_chunk`.
    pub fn get_task_chunk(
        &self,
        task_id: i64,
        chunk_number: i64,
        quality: mc_types::Quality,
    ) -> Option<DataWithMime> {
        self.get(&Self::task_chunk_key(task_id, chunk_number, quality))
    }

    pub fn get_or_set_task_chunk(
        &self,
        task_id: i64,
        chunk_number: i64,
        quality: mc_types::Quality,
        produce: impl FnOnce() -> mc_error::CoreResult<DataWithMime>,
    ) -> mc_error::CoreResult<DataWithMime> {
        self.get_or_set(&Self::task_chunk_key(task_id, chunk_number, quality), produce)
    }

    pub fn get_selective_job_chunk(
        &self,
        task: &Task,
        job: &Job,
        segment: &Segment,
        chunk_number: i64,
        quality: mc_types::Quality,
        sources: &MediaSources,
    ) -> mc_error::CoreResult<DataWithMime> {
        let key = Self::job_chunk_key(job.id, chunk_number, quality);
        self.get_or_set(&key, || {
            producers::prepare_masked_range_segment_chunk(
                task,
                segment,
                chunk_number,
                quality,
                sources,
            )
        })
    }

    pub fn remove_segment_chunk(
        &self,
        segment_id: i64,
        chunk_number: i64,
        quality: mc_types::Quality,
    ) {
        self.delete(&Self::segment_chunk_key(segment_id, chunk_number, quality));
    }

    // --- §4.3.2 segment preview ----------------------------------------------------

    pub fn get_or_set_segment_preview(
        &self,
        task: &Task,
        segment: &Segment,
        sources: &MediaSources,
    ) -> mc_error::CoreResult<DataWithMime> {
        let key = Self::segment_preview_key(segment.id);
        self.get_or_set(&key, || {
            producers::prepare_segment_preview(task, segment, sources)
        })
    }

    // --- §4.3.3 cloud-storage preview -----------------------------------------------

    pub fn get_cloud_preview(&self, cloud_storage_id: i64) -> Option<DataWithMime> {
        self.get(&Self::cloudstorage_preview_key(cloud_storage_id))
    }

    pub fn get_or_set_cloud_preview(
        &self,
        binding: &CloudStorageBinding,
        blob_store: Arc<dyn mc_types::BlobStore>,
        storage_dir: &std::path::Path,
    ) -> mc_error::CoreResult<DataWithMime> {
        let key = Self::cloudstorage_preview_key(binding.id);
        self.get_or_set(&key, || {
            producers::prepare_cloud_preview(binding, blob_store, storage_dir)
        })
    }

    // --- §4.3.4 context images -------------------------------------------------------

    /// `None` = no image record for this frame. `Some((bytes, mime))` with
    /// empty `bytes` = record exists but has no related files. Both cases
    /// skip the backend entirely, exactly like every other empty-producer
    /// result (spec §4.3, Open Question #1).
    pub fn get_frame_context_images(
        &self,
        data_id: i64,
        frame_number: i64,
        repository: &dyn mc_types::ContextImageRepository,
    ) -> mc_error::CoreResult<Option<(Vec<u8>, Option<String>)>> {
        let Some(related_paths) = repository.related_file_paths(data_id, frame_number)? else {
            return Ok(None);
        };
        if related_paths.is_empty() {
            return Ok(Some((Vec::new(), None)));
        }

        let key = Self::context_image_key(data_id, frame_number);
        let (bytes, mime) = self.get_or_set(&key, || {
            producers::build_context_image_archive(&related_paths)
        })?;
        Ok(Some((bytes, Some(mime))))
    }
}

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use mc_error::CoreResult;

use crate::job::Job;
use crate::segment::Segment;
use crate::task::Task;

/// `TaskRepository.get(task_id) -> Task snapshot` (spec §6).
pub trait TaskRepository: Send + Sync {
    fn get(&self, task_id: i64) -> CoreResult<Arc<Task>>;
}

/// `SegmentRepository.for_task(task_id) -> [Segment]`; `.get(segment_id)` (spec §6).
pub trait SegmentRepository: Send + Sync {
    fn for_task(&self, task_id: i64) -> CoreResult<Vec<Arc<Segment>>>;
    fn get(&self, segment_id: i64) -> CoreResult<Arc<Segment>>;
}

pub trait JobRepository: Send + Sync {
    fn get(&self, job_id: i64) -> CoreResult<Arc<Job>>;
}

/// `ImageRepository.list(task_id, frame_range) -> [(frame_id, relative_path)]` (spec §6).
pub trait ImageRepository: Send + Sync {
    fn list(&self, task_id: i64, frame_range: std::ops::RangeInclusive<i64>) -> CoreResult<Vec<(i64, String)>>;
}

/// `BlobStore.bulk_download(names, dest_dir)`, `.download_one(name) -> bytes`,
/// `.last_modified(name) -> timestamp` (spec §6). Concrete cloud-backend
/// implementations live outside this crate; `mc_media_reader::CloudImageReader`
/// only ever depends on this trait.
pub trait BlobStore: Send + Sync {
    fn bulk_download(&self, names: &[String], dest_dir: &Path) -> CoreResult<()>;
    fn download_one(&self, name: &str) -> CoreResult<Vec<u8>>;
    fn last_modified(&self, name: &str) -> CoreResult<SystemTime>;
}

/// `JobQueue.enqueue(task_fn, args, key, depends_on)` (spec §6) — used only
/// for the async production path; out of scope beyond this narrow interface.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, key: &str, depends_on: Option<&str>) -> CoreResult<()>;
}

/// Related (context) files attached to one frame's image record — the
/// collaborator behind the context-image cache producer (spec §4.3.4).
///
/// `None` means no image record exists for `(data_id, frame_number)`; `Some`
/// of an empty vec means the record exists but has no related files. This
/// mirrors the cache's own `None` vs. empty-sentinel distinction one layer
/// up (spec §4.3, Open Question #1).
pub trait ContextImageRepository: Send + Sync {
    fn related_file_paths(
        &self,
        data_id: i64,
        frame_number: i64,
    ) -> CoreResult<Option<Vec<std::path::PathBuf>>>;
}

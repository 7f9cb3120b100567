/// A work assignment over one segment (spec §3 `Job`).
///
/// A job's frame universe equals its segment's — the job is a thin handle to
/// its owning segment, nothing more (CVAT's `JobFrameProvider` is likewise
/// just a `SegmentFrameProvider` constructed from `db_job.segment`).
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub segment_id: i64,
}

use std::collections::BTreeSet;

use mc_error::{CoreError, CoreResult};

use crate::task::div_ceil;

/// `RANGE` segments are contiguous under the task's `frame_step`; `SPECIFIC_FRAMES`
/// segments are an arbitrary subset (spec §3 `Segment`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SegmentKind {
    Range,
    SpecificFrames,
}

/// A contiguous or arbitrary subset of a task's frames; the unit of
/// annotation work assignment (spec §3 `Segment`).
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: i64,
    pub task_id: i64,
    pub kind: SegmentKind,
    /// Ordered set of frame ids belonging to the task that this segment owns.
    pub frame_set: BTreeSet<i64>,
    pub start_frame: i64,
}

impl Segment {
    pub fn frame_count(&self) -> i64 {
        self.frame_set.len() as i64
    }

    /// Position of `frame` within the segment's ordered frame set, or `None`
    /// if the segment doesn't own it.
    pub fn index_of(&self, frame: i64) -> Option<i64> {
        if !self.frame_set.contains(&frame) {
            return None;
        }
        Some(self.frame_set.range(..frame).count() as i64)
    }

    /// Spec §4.5 `validate_frame_number`: membership check plus
    /// `(chunk_number, intra_chunk_offset) = divmod(index_of(f), chunk_size)`.
    pub fn validate_frame_number(
        &self,
        frame: i64,
        chunk_size: i64,
    ) -> CoreResult<(i64, i64, i64)> {
        let Some(index) = self.index_of(frame) else {
            return Err(CoreError::invalid_argument(format!(
                "incorrect requested frame number: {frame}"
            )));
        };
        Ok((frame, index / chunk_size, index % chunk_size))
    }

    pub fn get_chunk_number(&self, frame: i64, chunk_size: i64) -> i64 {
        frame / chunk_size
    }

    pub fn validate_chunk_number(&self, chunk_number: i64, chunk_size: i64) -> CoreResult<i64> {
        let stop_chunk = div_ceil(self.frame_count(), chunk_size);
        if !(0..=stop_chunk).contains(&chunk_number) {
            return Err(CoreError::invalid_argument(format!(
                "invalid chunk number '{chunk_number}': must be in [0, {stop_chunk}]"
            )));
        }
        Ok(chunk_number)
    }

    /// The frame ids this segment contributes to chunk `chunk_number`, in
    /// ascending order: `frame_set[chunk_size*k .. chunk_size*(k+1)]`.
    pub fn chunk_frame_ids(&self, chunk_number: i64, chunk_size: i64) -> Vec<i64> {
        let start = (chunk_size * chunk_number) as usize;
        let stop = (chunk_size * (chunk_number + 1)) as usize;
        self.frame_set
            .iter()
            .copied()
            .skip(start)
            .take(stop.saturating_sub(start))
            .collect()
    }

    pub fn lowest_frame(&self) -> Option<i64> {
        self.frame_set.iter().next().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_segment() -> Segment {
        Segment {
            id: 1,
            task_id: 1,
            kind: SegmentKind::Range,
            frame_set: (0..10).collect(),
            start_frame: 0,
        }
    }

    #[test]
    fn addressing_invariant_matches_spec_property_1() {
        let s = range_segment();
        for f in 0..10 {
            let (frame, chunk, offset) = s.validate_frame_number(f, 5).unwrap();
            assert_eq!(frame, f);
            assert_eq!(chunk * 5 + offset, f);
            assert!((0..5).contains(&offset));
        }
    }

    #[test]
    fn specific_frames_chunk_slice() {
        let s = Segment {
            id: 2,
            task_id: 1,
            kind: SegmentKind::SpecificFrames,
            frame_set: [0, 2, 5].into_iter().collect(),
            start_frame: 0,
        };
        assert_eq!(s.chunk_frame_ids(0, 6), vec![0, 2, 5]);
    }

    #[test]
    fn unknown_frame_is_invalid_argument() {
        let s = range_segment();
        assert!(matches!(
            s.validate_frame_number(42, 5),
            Err(CoreError::InvalidArgument(_))
        ));
    }
}

//! Physical frame table
//!
//! A fixed array of frames over the contiguous RAM buffer. A frame is free or
//! owned by exactly one `(pid, page)` pair; the page table of that process is
//! the other half of the invariant and is kept in sync by the memory manager.

use crate::process::ProcessId;

use super::FrameSnapshot;

/// One physical frame's ownership record.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frame {
    owner: Option<(ProcessId, usize)>,
}

impl Frame {
    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    pub fn owner(&self) -> Option<(ProcessId, usize)> {
        self.owner
    }
}

/// The fixed frame table.
#[derive(Debug)]
pub struct FrameTable {
    frames: Vec<Frame>,
}

impl FrameTable {
    pub fn new(frame_count: usize) -> Self {
        Self {
            frames: vec![Frame::default(); frame_count],
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the lowest free frame.
    pub fn find_free(&self) -> Option<usize> {
        self.frames.iter().position(Frame::is_free)
    }

    /// Record that `frame` now holds `page` of `pid`.
    pub fn assign(&mut self, frame: usize, pid: ProcessId, page: usize) {
        self.frames[frame].owner = Some((pid, page));
    }

    /// Release one frame.
    pub fn clear(&mut self, frame: usize) {
        self.frames[frame].owner = None;
    }

    pub fn owner(&self, frame: usize) -> Option<(ProcessId, usize)> {
        self.frames[frame].owner
    }

    /// Free every frame owned by `pid`; returns how many were released.
    pub fn release_owned_by(&mut self, pid: ProcessId) -> usize {
        let mut released = 0;
        for frame in &mut self.frames {
            if matches!(frame.owner, Some((owner, _)) if owner == pid) {
                frame.owner = None;
                released += 1;
            }
        }
        released
    }

    pub fn used_frames(&self) -> usize {
        self.frames.iter().filter(|f| !f.is_free()).count()
    }

    pub fn snapshot(&self) -> Vec<FrameSnapshot> {
        self.frames
            .iter()
            .map(|f| FrameSnapshot {
                free: f.is_free(),
                owner_pid: f.owner.map(|(pid, _)| pid),
            })
            .collect()
    }
}

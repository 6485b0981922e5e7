//! The memory manager
//!
//! Owns physical RAM, the frame table, and the backing store behind one lock
//! (`mem_lock`). Translation, byte movement, fault service, and eviction all
//! run under that lock, which makes every access atomic with respect to
//! eviction of the same page.
//!
//! Lock order: callers may hold the scheduler lock when entering; this module
//! additionally takes the directory lock (victim scan) and per-PCB `mem`
//! locks, never the scheduler lock.

use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::Local;
use log::{debug, trace, warn};

use crate::{
    clock,
    error::MemoryError,
    process::{MemoryViolation, Process, ProcessMemory, ProcessState, ProcessTable},
};

use super::{
    is_valid_proc_mem, BackingStore, FrameSnapshot, FrameTable, PageTable, PagingStats,
};

/// Outcome of a memory access.
///
/// `PageFault` and `SegFault` are control flow, not errors: the worker blocks
/// or terminates the process accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum MemAccess<T> {
    /// Access completed; payload is the physical address or the loaded value.
    Ok(T),
    /// The page is valid but not resident; the process must block and retry.
    PageFault,
    /// The address is outside the allocation; the process must terminate.
    SegFault,
}

struct MmInner {
    ram: Vec<u8>,
    frames: FrameTable,
    store: BackingStore,
}

/// Demand-paging memory manager.
pub struct MemoryManager {
    frame_size: usize,
    total_bytes: usize,
    inner: Mutex<MmInner>,
    stats: PagingStats,
    table: Arc<ProcessTable>,
}

impl MemoryManager {
    /// Build the manager over `total_bytes` of RAM split into
    /// `total_bytes / frame_size` frames, with a fresh backing store at
    /// `store_path`. The process table is consulted during victim selection.
    pub fn new(
        total_bytes: usize,
        frame_size: usize,
        store_path: &Path,
        table: Arc<ProcessTable>,
    ) -> Result<Self, MemoryError> {
        let store = BackingStore::open(store_path)?;
        let frame_count = total_bytes / frame_size;
        debug!(
            "memory manager: {total_bytes} bytes of RAM, {frame_count} frames of {frame_size} bytes, store at {}",
            store_path.display()
        );
        Ok(Self {
            frame_size,
            total_bytes,
            inner: Mutex::new(MmInner {
                ram: vec![0u8; total_bytes],
                frames: FrameTable::new(frame_count),
                store,
            }),
            stats: PagingStats::new(),
            table,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Reserve backing-store space for `proc` and size its page table.
    pub fn allocate(&self, proc: &Process, size: usize) -> Result<(), MemoryError> {
        if !is_valid_proc_mem(size) {
            return Err(MemoryError::InvalidSize { requested: size });
        }
        let mut inner = self.lock_inner();
        let offset = inner.store.reserve(size)?;

        let mut mem = proc.mem.lock();
        mem.size_bytes = size;
        mem.backing_store_offset = offset;
        mem.page_table = PageTable::with_pages(size.div_ceil(self.frame_size));
        mem.created_at = clock::monotonic_ns();
        debug!(
            "allocated {size} bytes for process {} ({}) at store offset {offset}",
            proc.name, proc.pid
        );
        Ok(())
    }

    /// Translate one byte address: returns the physical address on a hit,
    /// marks the page dirty on a write hit, records the pending fault on a
    /// miss, and records the violation when out of bounds. `read_word` /
    /// `write_word` are the execution path; this is the single-byte view for
    /// tests and diagnostics.
    pub fn translate(&self, proc: &Process, address: usize, is_write: bool) -> MemAccess<usize> {
        let _inner = self.lock_inner();
        let mut mem = proc.mem.lock();
        if address >= mem.size_bytes {
            return self.raise_violation(&mut mem, proc, address);
        }
        let (page, offset) = (address / self.frame_size, address % self.frame_size);
        match mem.page_table[page].frame() {
            Some(frame) => {
                if is_write {
                    mem.page_table[page].mark_dirty();
                }
                MemAccess::Ok(frame * self.frame_size + offset)
            }
            None => {
                mem.pending_fault = Some(page);
                MemAccess::PageFault
            }
        }
    }

    /// Load the 16-bit little-endian word at `address`.
    pub fn read_word(&self, proc: &Process, address: usize) -> MemAccess<u16> {
        let inner = self.lock_inner();
        let mut mem = proc.mem.lock();
        let frames = match self.resolve_word(&mut mem, proc, address) {
            MemAccess::Ok(frames) => frames,
            MemAccess::PageFault => return MemAccess::PageFault,
            MemAccess::SegFault => return MemAccess::SegFault,
        };
        let mut bytes = [0u8; 2];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = inner.ram[frames[i] * self.frame_size + (address + i) % self.frame_size];
        }
        MemAccess::Ok(u16::from_le_bytes(bytes))
    }

    /// Store `value` as a 16-bit little-endian word at `address`.
    pub fn write_word(&self, proc: &Process, address: usize, value: u16) -> MemAccess<()> {
        let mut inner = self.lock_inner();
        let mut mem = proc.mem.lock();
        let frames = match self.resolve_word(&mut mem, proc, address) {
            MemAccess::Ok(frames) => frames,
            MemAccess::PageFault => return MemAccess::PageFault,
            MemAccess::SegFault => return MemAccess::SegFault,
        };
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            let a = address + i;
            mem.page_table[a / self.frame_size].mark_dirty();
            inner.ram[frames[i] * self.frame_size + a % self.frame_size] = byte;
        }
        MemAccess::Ok(())
    }

    /// Resolve both bytes of a word to resident frames, or raise the
    /// appropriate outcome. Both pages must be resident before any byte is
    /// touched so a straddling word is never half-written.
    fn resolve_word(
        &self,
        mem: &mut ProcessMemory,
        proc: &Process,
        address: usize,
    ) -> MemAccess<[usize; 2]> {
        let end = match address.checked_add(1) {
            Some(end) if end < mem.size_bytes => end,
            _ => return self.raise_violation(mem, proc, address),
        };
        let mut frames = [0usize; 2];
        for (i, a) in [address, end].into_iter().enumerate() {
            let page = a / self.frame_size;
            match mem.page_table[page].frame() {
                Some(frame) => frames[i] = frame,
                None => {
                    mem.pending_fault = Some(page);
                    return MemAccess::PageFault;
                }
            }
        }
        MemAccess::Ok(frames)
    }

    fn raise_violation<T>(
        &self,
        mem: &mut ProcessMemory,
        proc: &Process,
        address: usize,
    ) -> MemAccess<T> {
        if mem.violation.is_none() {
            mem.violation = Some(MemoryViolation {
                address,
                occurred_at: Local::now(),
            });
        }
        warn!(
            "process {} ({}) memory access violation at 0x{address:x} (allocation {} bytes)",
            proc.name, proc.pid, mem.size_bytes
        );
        MemAccess::SegFault
    }

    /// Service the outstanding fault recorded on `proc`: find or evict a
    /// frame, load the page from the backing store, and map it. Returns
    /// whether a page was actually brought in.
    pub fn service_pending_fault(&self, proc: &Process) -> Result<bool, MemoryError> {
        let mut inner = self.lock_inner();

        // Snapshot, then release the PCB lock: eviction may pick this same
        // process as its victim and needs to retake it.
        let (page, store_offset, size_bytes) = {
            let mut mem = proc.mem.lock();
            let Some(page) = mem.pending_fault else {
                return Ok(false);
            };
            if mem.page_table[page].is_present() {
                mem.pending_fault = None;
                return Ok(false);
            }
            (page, mem.backing_store_offset, mem.size_bytes)
        };

        let frame = match inner.frames.find_free() {
            Some(frame) => frame,
            None => self.evict(&mut inner)?,
        };

        let fs = self.frame_size;
        let len = fs.min(size_bytes - page * fs);
        let MmInner { ram, frames, store } = &mut *inner;
        let slot = &mut ram[frame * fs..(frame + 1) * fs];
        slot.fill(0);
        store.read_page(store_offset + (page * fs) as u64, &mut slot[..len])?;
        frames.assign(frame, proc.pid, page);

        let mut mem = proc.mem.lock();
        mem.page_table[page].map(frame);
        mem.pending_fault = None;
        self.stats.record_page_in();
        trace!(
            "paged in page {page} of process {} ({}) into frame {frame}",
            proc.name,
            proc.pid
        );
        Ok(true)
    }

    /// Oldest-process victim selection: among live, non-blocked processes
    /// holding at least one resident page, take the one with the smallest
    /// memory-creation stamp and evict its lowest resident page.
    fn evict(&self, inner: &mut MmInner) -> Result<usize, MemoryError> {
        let mut victim: Option<(u64, Arc<Process>)> = None;
        for proc in self.table.processes() {
            if !matches!(proc.state(), ProcessState::Ready | ProcessState::Running) {
                continue;
            }
            let mem = proc.mem.lock();
            if !mem.page_table.has_present() {
                continue;
            }
            let stamp = mem.created_at;
            drop(mem);
            if victim.as_ref().is_none_or(|(best, _)| stamp < *best) {
                victim = Some((stamp, proc));
            }
        }
        let Some((_, victim)) = victim else {
            return Err(MemoryError::NoEvictable);
        };

        let fs = self.frame_size;
        let mut mem = victim.mem.lock();
        let Some((page, frame)) = mem.page_table.first_present() else {
            // Page tables only change under the inner lock, which we hold.
            return Err(MemoryError::NoEvictable);
        };
        if mem.page_table[page].is_dirty() {
            let len = fs.min(mem.size_bytes - page * fs);
            let MmInner { ram, store, .. } = &mut *inner;
            store.write_page(
                mem.backing_store_offset + (page * fs) as u64,
                &ram[frame * fs..frame * fs + len],
            )?;
            self.stats.record_page_out();
            trace!(
                "paged out dirty page {page} of process {} ({}) from frame {frame}",
                victim.name,
                victim.pid
            );
        } else {
            trace!(
                "evicted clean page {page} of process {} ({}) from frame {frame}",
                victim.name,
                victim.pid
            );
        }
        mem.page_table[page].unmap();
        inner.frames.clear(frame);
        Ok(frame)
    }

    /// Release every frame owned by `proc`. Backing-store bytes remain.
    pub fn deallocate(&self, proc: &Process) {
        let mut inner = self.lock_inner();
        let released = inner.frames.release_owned_by(proc.pid);

        let mut mem = proc.mem.lock();
        for pte in mem.page_table.iter_mut() {
            pte.unmap();
        }
        mem.pending_fault = None;
        if released > 0 {
            debug!(
                "released {released} frame(s) held by process {} ({})",
                proc.name, proc.pid
            );
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.lock_inner().frames.used_frames() * self.frame_size
    }

    pub fn free_bytes(&self) -> usize {
        self.total_bytes - self.used_bytes()
    }

    pub fn frame_snapshot(&self) -> Vec<FrameSnapshot> {
        self.lock_inner().frames.snapshot()
    }

    /// High-water mark of the backing store.
    pub fn backing_store_len(&self) -> u64 {
        self.lock_inner().store.len()
    }

    pub fn stats(&self) -> &PagingStats {
        &self.stats
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, MmInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

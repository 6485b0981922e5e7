//! Per-process memory metadata
//!
//! Everything the memory manager tracks about one process: allocation size,
//! backing-store placement, the page table, the outstanding fault, and the
//! violation record a segmentation fault leaves behind for `screen -r`.

use chrono::{DateTime, Local};

use crate::mm::PageTable;

/// Memory metadata embedded in the PCB, guarded by the PCB's `mem` lock.
#[derive(Debug)]
pub struct ProcessMemory {
    /// Allocation size in bytes; a power of two in `[64, 65536]`.
    pub size_bytes: usize,
    /// Byte offset of this process's image in the backing store.
    pub backing_store_offset: u64,
    /// Virtual page -> frame mapping.
    pub page_table: PageTable,
    /// Monotonic stamp taken at allocation; orders eviction victims.
    pub created_at: u64,
    /// Page number of the fault raised by the last failed access, until the
    /// scheduler services it.
    pub pending_fault: Option<usize>,
    /// Set exactly once, by the access that went out of bounds.
    pub violation: Option<MemoryViolation>,
}

impl ProcessMemory {
    /// Metadata of a process that has not been allocated yet.
    pub fn unallocated() -> Self {
        Self {
            size_bytes: 0,
            backing_store_offset: 0,
            page_table: PageTable::with_pages(0),
            created_at: 0,
            pending_fault: None,
            violation: None,
        }
    }

    /// Number of pages spanned by the allocation.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }
}

/// Record of a segmentation fault.
#[derive(Debug, Clone)]
pub struct MemoryViolation {
    /// The offending virtual address.
    pub address: usize,
    /// Wall-clock time of the access.
    pub occurred_at: DateTime<Local>,
}

impl MemoryViolation {
    /// The diagnostic line surfaced by `screen -r` and the console notice.
    pub fn diagnostic(&self, process_name: &str) -> String {
        format!(
            "Process {} shut down due to memory access violation error that occurred at {}. 0x{:x} invalid.",
            process_name,
            self.occurred_at.format("%H:%M:%S"),
            self.address,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_names_the_address_in_hex() {
        let violation = MemoryViolation {
            address: 0xFFFF,
            occurred_at: Local::now(),
        };
        let line = violation.diagnostic("p07");
        assert!(line.contains("memory access violation"));
        assert!(line.contains("0xffff invalid."));
        assert!(line.starts_with("Process p07"));
    }
}

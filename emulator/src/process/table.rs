//! Process name directory
//!
//! Maps names to PCBs for `screen -r` lookups and enforces name uniqueness
//! across live and finished processes. Submission reserves a name before the
//! scheduler materializes the PCB, so two in-flight requests can never race
//! into the same name.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use spin::RwLock;

use crate::error::SchedError;

use super::Process;

#[derive(Default)]
struct Directory {
    /// Every PCB ever admitted, live and finished, keyed by name.
    entries: BTreeMap<String, Arc<Process>>,
    /// Names claimed by requests still waiting in the creation queue.
    reserved: BTreeSet<String>,
}

/// Global name -> PCB directory (`dir_lock`).
#[derive(Default)]
pub struct ProcessTable {
    inner: RwLock<Directory>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a name for a pending creation request.
    pub fn reserve(&self, name: &str) -> Result<(), SchedError> {
        let mut dir = self.inner.write();
        if dir.entries.contains_key(name) || !dir.reserved.insert(name.to_string()) {
            return Err(SchedError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Drop a reservation whose request never materialized.
    pub fn release(&self, name: &str) {
        self.inner.write().reserved.remove(name);
    }

    /// Turn a reservation into a directory entry.
    pub fn bind(&self, process: Arc<Process>) {
        let mut dir = self.inner.write();
        dir.reserved.remove(&process.name);
        dir.entries.insert(process.name.clone(), process);
    }

    /// Look up a process by name.
    pub fn get(&self, name: &str) -> Option<Arc<Process>> {
        self.inner.read().entries.get(name).cloned()
    }

    /// Snapshot of every registered PCB. Cloned out so no caller holds
    /// `dir_lock` while touching PCB internals.
    pub fn processes(&self) -> Vec<Arc<Process>> {
        self.inner.read().entries.values().cloned().collect()
    }

    /// Number of admitted processes (live + finished).
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessId;

    #[test]
    fn reservation_blocks_duplicates() {
        let table = ProcessTable::new();
        table.reserve("alpha").unwrap();
        assert!(matches!(
            table.reserve("alpha"),
            Err(SchedError::DuplicateName { .. })
        ));
        table.release("alpha");
        table.reserve("alpha").unwrap();
    }

    #[test]
    fn bound_names_stay_unique_forever() {
        let table = ProcessTable::new();
        table.reserve("alpha").unwrap();
        table.bind(Arc::new(Process::new(ProcessId(1), "alpha".into(), Vec::new())));
        assert!(table.reserve("alpha").is_err());
        assert_eq!(table.get("alpha").unwrap().pid, ProcessId(1));
        assert_eq!(table.len(), 1);
    }
}

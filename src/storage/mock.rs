//! Mock record store for testing
//!
//! In-memory [`Dataman`] backend for unit tests and SITL harnesses. Supports
//! fault injection on reads, writes and locking so every storage failure path
//! of the protocol can be exercised, plus write counters for commit-ordering
//! assertions.
//!
//! # Example
//!
//! ```ignore
//! use mission_link::storage::mock::MockDataman;
//! use mission_link::storage::{Dataman, DmRegion, PersistClass};
//!
//! let mut dm = MockDataman::new();
//! dm.write(DmRegion::SafePoints, 0, PersistClass::PowerOnReset, &[1, 2, 3, 4])
//!     .unwrap();
//!
//! let mut buf = [0u8; 4];
//! let n = dm.read(DmRegion::SafePoints, 0, &mut buf).unwrap();
//! assert_eq!(&buf[..n], &[1, 2, 3, 4]);
//! ```

#![cfg(any(test, feature = "mock"))]

use super::{Dataman, DmRegion, PersistClass, Result, StorageError};
use std::collections::BTreeMap;
use std::vec::Vec;

/// In-memory record store with fault injection.
#[derive(Debug, Default)]
pub struct MockDataman {
    /// Records per region, keyed by index
    regions: [BTreeMap<u16, Vec<u8>>; DmRegion::COUNT],
    /// Advisory lock state per region
    locked: [bool; DmRegion::COUNT],
    /// Fail every write
    fail_all_writes: bool,
    /// Fail writes to one specific record only
    fail_write_at: Option<(DmRegion, u16)>,
    /// Fail every read
    fail_reads: bool,
    /// Fail lock acquisition
    fail_lock: bool,
    /// Successful writes since creation
    write_count: u32,
}

impl MockDataman {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes of a stored record (for test verification).
    pub fn record(&self, region: DmRegion, index: u16) -> Option<&[u8]> {
        self.regions[region.table_index()]
            .get(&index)
            .map(|r| r.as_slice())
    }

    /// Number of records present in a region.
    pub fn record_count(&self, region: DmRegion) -> usize {
        self.regions[region.table_index()].len()
    }

    /// Make every write fail until cleared.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_all_writes = fail;
    }

    /// Make writes to one specific record fail.
    pub fn fail_write_at(&mut self, region: DmRegion, index: u16) {
        self.fail_write_at = Some((region, index));
    }

    /// Make every read fail until cleared.
    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Make lock acquisition fail.
    pub fn fail_lock(&mut self, fail: bool) {
        self.fail_lock = fail;
    }

    /// Advisory lock state of a region.
    pub fn is_locked(&self, region: DmRegion) -> bool {
        self.locked[region.table_index()]
    }

    /// Successful writes since creation (for commit-ordering assertions).
    pub fn write_count(&self) -> u32 {
        self.write_count
    }
}

impl Dataman for MockDataman {
    fn read(&mut self, region: DmRegion, index: u16, buf: &mut [u8]) -> Result<usize> {
        if self.fail_reads {
            return Err(StorageError::ReadFailed);
        }

        let record = self.regions[region.table_index()]
            .get(&index)
            .ok_or(StorageError::ReadFailed)?;

        let n = record.len().min(buf.len());
        buf[..n].copy_from_slice(&record[..n]);
        Ok(n)
    }

    fn write(
        &mut self,
        region: DmRegion,
        index: u16,
        _persist: PersistClass,
        data: &[u8],
    ) -> Result<usize> {
        if self.fail_all_writes || self.fail_write_at == Some((region, index)) {
            return Err(StorageError::WriteFailed);
        }

        self.regions[region.table_index()].insert(index, data.to_vec());
        self.write_count += 1;
        Ok(data.len())
    }

    fn lock(&mut self, region: DmRegion) -> Result<()> {
        if self.fail_lock || self.locked[region.table_index()] {
            return Err(StorageError::LockUnavailable);
        }

        self.locked[region.table_index()] = true;
        Ok(())
    }

    fn unlock(&mut self, region: DmRegion) {
        self.locked[region.table_index()] = false;
    }
}

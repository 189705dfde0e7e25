//! Scheduling pass configuration.

use bon::bon;
use strata_ir::Location;

/// Fallback-plan stride alignment used when none is configured.
pub const DEFAULT_ALIGNMENT: u64 = 4;

/// Options for one [`schedule`](crate::schedule) invocation.
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// Locality stamped onto cache-entry refinements and the cache side of
    /// swap blocks.
    pub mem_loc: Location,
    /// Cache capacity in KiB, per locality unit.
    pub mem_kib: u64,
    /// Fallback-plan alignment in bytes; zero means [`DEFAULT_ALIGNMENT`].
    pub alignment: u64,
    /// Locality stamped on generated swap blocks.
    pub xfer_loc: Location,
}

#[bon]
impl ScheduleOptions {
    #[builder]
    pub fn new(
        mem_loc: Location,
        mem_kib: u64,
        #[builder(default = 0)] alignment: u64,
        xfer_loc: Location,
    ) -> Self {
        Self { mem_loc, mem_kib, alignment, xfer_loc }
    }

    pub fn mem_bytes(&self) -> u64 {
        self.mem_kib * 1024
    }

    pub fn effective_alignment(&self) -> u64 {
        if self.alignment == 0 { DEFAULT_ALIGNMENT } else { self.alignment }
    }
}

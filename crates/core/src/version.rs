//! Optimistic concurrency primitives for versioned records.

/// Optimistic concurrency expectation for a versioned record.
///
/// A writer that read a record at version `v` presents `Exact(v)` on commit;
/// if another writer advanced the record past `v` in the meantime, the commit
/// is rejected and the caller must re-read and retry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (useful for idempotent writes, migrations, etc.).
    Any,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}

/// A record guarded by a monotonically increasing version counter.
///
/// Stores bump the version on every successful commit; readers carry the
/// observed version back on their next write.
pub trait Versioned {
    fn version(&self) -> u64;

    fn bump_version(&mut self);
}

//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep kernel identifiers apart from arena handles,
//! so a `Pid` read from `/proc` can never be used where a `ProcessId` slot
//! index is expected.

use std::fmt;

/// Process ID
///
/// Represents a process ID as the kernel reports it in `/proc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl Pid {
    /// The init process.
    pub const INIT: Pid = Pid(1);
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<i32> for Pid {
    #[allow(clippy::cast_sign_loss)]
    fn from(pid: i32) -> Self {
        Pid(pid as u32)
    }
}

/// CPU ID
///
/// Logical CPU number as found in the `cpuN` rows of `/proc/schedstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU:{}", self.0)
    }
}

/// Point in time or elapsed time in seconds, as read from the boot clock.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Seconds(pub f64);

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

impl std::ops::Sub for Seconds {
    type Output = Seconds;

    fn sub(self, rhs: Seconds) -> Seconds {
        Seconds(self.0 - rhs.0)
    }
}

/// Handle of a [`TickRecord`](crate::model::TickRecord) in the trace arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickId(pub usize);

/// Handle of a [`ProcessRecord`](crate::registry::ProcessRecord) in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub usize);

/// Handle of a [`ProcessSample`](crate::model::ProcessSample) in the trace arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleId(pub usize);

//! Boot-time clock
//!
//! Samples are timestamped against `CLOCK_BOOTTIME` so that time spent in
//! suspend is counted, falling back to `CLOCK_MONOTONIC` on kernels that do
//! not support it. The clock id is resolved once when the clock is built.

#![allow(unsafe_code)] // clock_gettime() and timerfd_create() require unsafe

use crate::domain::Seconds;

const NSEC_PER_SEC: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, Copy)]
pub struct BootClock {
    clock_id: libc::clockid_t,
}

impl Default for BootClock {
    fn default() -> Self {
        Self::new()
    }
}

impl BootClock {
    pub fn new() -> Self {
        Self { clock_id: resolve_clock_id() }
    }

    /// Whether the boot-time clock (including suspend) is in use.
    pub fn is_boottime(&self) -> bool {
        self.clock_id == libc::CLOCK_BOOTTIME
    }

    /// Current reading in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn now(&self) -> Seconds {
        let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
        // SAFETY: ts is a valid, writable timespec and clock_id was probed at construction
        let r = unsafe { libc::clock_gettime(self.clock_id, &mut ts) };
        if r != 0 {
            log::error!("clock_gettime failed: {}", std::io::Error::last_os_error());
        }
        Seconds(ts.tv_sec as f64 + ts.tv_nsec as f64 / NSEC_PER_SEC)
    }
}

/// Probe for `CLOCK_BOOTTIME` support by creating a timer on it.
fn resolve_clock_id() -> libc::clockid_t {
    // SAFETY: plain syscall with constant flags; the fd is closed right away
    let fd = unsafe {
        libc::timerfd_create(libc::CLOCK_BOOTTIME, libc::TFD_NONBLOCK | libc::TFD_CLOEXEC)
    };
    if fd < 0 {
        log::debug!("CLOCK_BOOTTIME unavailable, using CLOCK_MONOTONIC");
        return libc::CLOCK_MONOTONIC;
    }
    // SAFETY: fd was just returned by timerfd_create and is owned here
    unsafe { libc::close(fd) };
    libc::CLOCK_BOOTTIME
}

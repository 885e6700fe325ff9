// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// Region adapter: mutually-exclusive, cross-process access to a named
// fixed-size byte buffer.
//
// Exclusion is a two-stage handshake. A manual-reset "idle" event gates
// claimants: try_lock consumes the signal, then takes the mutex (expected
// to be uncontended once the gate is passed). unlock releases the mutex and
// re-sets the event. The mutex alone would suffice in the common case, but
// it survives a claimant that dies inside its critical section (robust /
// abandonment-aware), which the event cannot do on its own.

use std::io;

use crate::platform::{PlatformEvent, PlatformMutex, PlatformShm};

/// Name of the region's mutex, derived from the channel name.
pub fn mutex_name(name: &str) -> String {
    format!("GlobalMutex_{name}")
}

/// Name of the region's idle event, derived from the channel name.
pub fn event_name(name: &str) -> String {
    format!("GlobalEvt_{name}")
}

/// Capability seam over the OS-backed shared region, so the protocol and
/// channel layers never touch a platform type directly.
pub trait RegionAdapter: Sized {
    /// Create or open the named region of `size` bytes plus its paired
    /// lock and idle signal.
    fn open(name: &str, size: u32) -> io::Result<Self>;

    /// Non-blocking claim. `false` if another process holds or is claiming
    /// the region.
    fn try_lock(&self) -> bool;

    /// Blocking claim; used at construction and teardown only.
    fn wait_lock(&self) -> bool;

    /// Release the claim and re-signal idle.
    fn unlock(&self);

    /// Probe the idle signal without claiming.
    fn is_idle(&self) -> bool;

    /// Base pointer of the mapped region; null after `release`.
    /// Only dereference while holding the lock.
    fn mem(&self) -> *mut u8;

    /// Region size in bytes.
    fn size(&self) -> u32;

    /// Close all OS handles and unmap. Idempotent.
    fn release(&mut self);
}

/// The one concrete adapter: named shared memory plus a named mutex
/// (`GlobalMutex_<name>`) and a named manual-reset idle event
/// (`GlobalEvt_<name>`), all platform primitives.
pub struct SharedRegion {
    shm: Option<PlatformShm>,
    lock: Option<PlatformMutex>,
    idle: Option<PlatformEvent>,
    size: u32,
}

impl SharedRegion {
    /// Remove the backing storage for a named region (segment, mutex, and
    /// event). POSIX named objects outlive their processes; call this when
    /// a stale segment from a crashed run should be discarded.
    pub fn clear_storage(name: &str) {
        PlatformShm::unlink_by_name(name);
        PlatformMutex::clear_storage(&mutex_name(name));
        PlatformEvent::clear_storage(&event_name(name));
    }
}

impl RegionAdapter for SharedRegion {
    fn open(name: &str, size: u32) -> io::Result<Self> {
        let shm = PlatformShm::acquire(name, size as usize)?;
        let idle = PlatformEvent::open(&event_name(name))?;
        let lock = PlatformMutex::open(&mutex_name(name))?;
        Ok(Self {
            shm: Some(shm),
            lock: Some(lock),
            idle: Some(idle),
            size,
        })
    }

    fn try_lock(&self) -> bool {
        let (Some(idle), Some(lock)) = (&self.idle, &self.lock) else {
            return false;
        };
        match idle.test_and_reset() {
            Ok(true) => {}
            _ => return false,
        }
        // The gate is ours; the mutex acquisition is expected to succeed
        // immediately unless a previous claimant died mid-section.
        if lock.lock().is_err() {
            let _ = idle.set();
            return false;
        }
        true
    }

    fn wait_lock(&self) -> bool {
        let (Some(idle), Some(lock)) = (&self.idle, &self.lock) else {
            return false;
        };
        if idle.wait_and_reset().is_err() {
            return false;
        }
        if lock.lock().is_err() {
            let _ = idle.set();
            return false;
        }
        true
    }

    fn unlock(&self) {
        if let Some(lock) = &self.lock {
            let _ = lock.unlock();
        }
        if let Some(idle) = &self.idle {
            let _ = idle.set();
        }
    }

    fn is_idle(&self) -> bool {
        match &self.idle {
            Some(idle) => idle.is_set().unwrap_or(false),
            None => false,
        }
    }

    fn mem(&self) -> *mut u8 {
        match &self.shm {
            Some(shm) => shm.as_mut_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn release(&mut self) {
        self.idle = None;
        self.lock = None;
        self.shm = None;
    }
}

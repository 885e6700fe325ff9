// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// POSIX implementation of the named shared memory, mutex, and idle-event
// primitives used by the region adapter.
//
// The mutex is a PTHREAD_PROCESS_SHARED (and, where available, robust)
// pthread_mutex_t living in its own shm segment. The idle event has Win32
// manual-reset semantics and is emulated with a process-shared mutex, a
// condition variable, and a flag word, all in one shm segment.

use std::collections::HashMap;
use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::shm_name;

// ---------------------------------------------------------------------------
// Process-local shm cache.
// All threads within the same process that open the same named mutex or
// event MUST use the same mmap. macOS's pthread implementation stores
// internal pointers relative to the virtual address used for
// pthread_mutex_init, so a second mmap of the same physical page at a
// different address causes EINVAL on pthread_mutex_lock.
// ---------------------------------------------------------------------------

pub(crate) struct CachedShm {
    pub(crate) shm: PlatformShm,
    local_ref: AtomicUsize,
}

pub(crate) struct ShmCache {
    map: HashMap<String, Arc<CachedShm>>,
}

fn mutex_cache() -> &'static Mutex<ShmCache> {
    static CACHE: OnceLock<Mutex<ShmCache>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(ShmCache {
            map: HashMap::new(),
        })
    })
}

fn event_cache() -> &'static Mutex<ShmCache> {
    static CACHE: OnceLock<Mutex<ShmCache>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(ShmCache {
            map: HashMap::new(),
        })
    })
}

/// Acquire or reuse a cached shm handle.
///
/// If this is the first local open for `name`, `init_fn` runs with the shm
/// pointer while the cache lock is still held, so no other thread can use
/// the handle before initialisation completes. `init_fn` only runs when the
/// segment was freshly created (cross-process ref count was zero).
fn cached_shm_acquire<F>(
    cache: &Mutex<ShmCache>,
    name: &str,
    size: usize,
    init_fn: F,
) -> io::Result<Arc<CachedShm>>
where
    F: FnOnce(*mut u8) -> io::Result<()>,
{
    let mut c = cache.lock().unwrap();
    if let Some(entry) = c.map.get(name) {
        entry.local_ref.fetch_add(1, Ordering::Relaxed);
        return Ok(Arc::clone(entry));
    }
    let shm = PlatformShm::acquire(name, size)?;
    if shm.prev_ref_count() == 0 {
        init_fn(shm.as_mut_ptr())?;
    }
    let entry = Arc::new(CachedShm {
        shm,
        local_ref: AtomicUsize::new(1),
    });
    c.map.insert(name.to_string(), Arc::clone(&entry));
    Ok(entry)
}

/// Release one local reference. When the last local ref drops, remove from cache.
fn cached_shm_release(cache: &Mutex<ShmCache>, name: &str) {
    let mut c = cache.lock().unwrap();
    if let Some(entry) = c.map.get(name) {
        let prev = entry.local_ref.fetch_sub(1, Ordering::AcqRel);
        if prev <= 1 {
            c.map.remove(name);
        }
    }
}

/// Forcibly remove a cache entry (used by `clear_storage` to avoid stale
/// entries after the underlying shm has been unlinked).
fn cached_shm_purge(cache: &Mutex<ShmCache>, name: &str) {
    let mut c = cache.lock().unwrap();
    c.map.remove(name);
}

// ---------------------------------------------------------------------------
// Robust mutex symbols — not exposed by `libc` on all platforms.
// On macOS robust mutexes are unavailable; the idle event still gates
// claimants there.
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "macos"))]
const EOWNERDEAD: i32 = libc::EOWNERDEAD;

#[cfg(not(target_os = "macos"))]
extern "C" {
    fn pthread_mutexattr_setrobust(
        attr: *mut libc::pthread_mutexattr_t,
        robustness: libc::c_int,
    ) -> libc::c_int;
    fn pthread_mutex_consistent(mutex: *mut libc::pthread_mutex_t) -> libc::c_int;
}

#[cfg(not(target_os = "macos"))]
const PTHREAD_MUTEX_ROBUST: libc::c_int = 1;

// ---------------------------------------------------------------------------
// Layout helpers: every segment carries a trailing atomic<i32> ref counter
// so the backing object can be unlinked when the last handle drops.
// ---------------------------------------------------------------------------

const ALIGN: usize = std::mem::align_of::<AtomicI32>();

pub(crate) fn calc_size(user_size: usize) -> usize {
    let aligned = ((user_size.wrapping_sub(1) / ALIGN) + 1) * ALIGN;
    aligned + std::mem::size_of::<AtomicI32>()
}

/// Reference to the trailing ref counter of a mapped region.
///
/// # Safety
/// `mem` must point to a valid mapped region of at least `total_size` bytes.
unsafe fn acc_of(mem: *mut u8, total_size: usize) -> &'static AtomicI32 {
    let offset = total_size - std::mem::size_of::<AtomicI32>();
    &*(mem.add(offset) as *const AtomicI32)
}

// ---------------------------------------------------------------------------
// PlatformShm — POSIX shared memory (shm_open + mmap, create-or-open)
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,      // total mapped size (including ref counter)
    user_size: usize, // user-requested size
    name: String,     // POSIX name (with leading '/')
    prev_ref: i32,    // ref count *before* our fetch_add (0 means we were first)
}

// Safety: the shared memory region is process-shared by design.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    /// Acquire a named shared memory region of `user_size` usable bytes,
    /// creating it if it does not yet exist.
    pub fn acquire(name: &str, user_size: usize) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if user_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let posix_name = shm_name::make_shm_name(name);
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let perms: libc::mode_t = 0o666;
        let total_size = calc_size(user_size);

        // Try exclusive create first so ftruncate only runs when we own the
        // new object. On macOS, ftruncate on an already-sized shm object can
        // zero its contents before returning EINVAL.
        let f = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                perms as libc::c_uint,
            )
        };
        let (fd, need_truncate) = if f != -1 {
            (f, true)
        } else {
            let e = io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::EEXIST) {
                return Err(e);
            }
            let f2 =
                unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, perms as libc::c_uint) };
            if f2 == -1 {
                return Err(io::Error::last_os_error());
            }
            (f2, false)
        };

        unsafe { libc::fchmod(fd, perms) };

        if need_truncate {
            let ret = unsafe { libc::ftruncate(fd, total_size as libc::off_t) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let prev = unsafe { acc_of(mem as *mut u8, total_size).fetch_add(1, Ordering::AcqRel) };

        Ok(Self {
            mem: mem as *mut u8,
            size: total_size,
            user_size,
            name: posix_name,
            prev_ref: prev,
        })
    }

    /// Mutable pointer to the user-visible region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// User-requested size (excludes the trailing ref counter).
    pub fn user_size(&self) -> usize {
        self.user_size
    }

    /// The ref count value *before* our own increment during acquire.
    /// Returns 0 if this handle was the first to map the segment.
    pub fn prev_ref_count(&self) -> i32 {
        self.prev_ref
    }

    /// Force-remove the backing object (shm_unlink). Does NOT release the mapping.
    pub fn unlink(&self) {
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }

    /// Unlink a named shm segment without needing an open handle.
    pub fn unlink_by_name(name: &str) {
        let posix_name = shm_name::make_shm_name(name);
        if let Ok(c_name) = CString::new(posix_name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        let prev = unsafe { acc_of(self.mem, self.size).fetch_sub(1, Ordering::AcqRel) };
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        if prev <= 1 {
            self.unlink();
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformMutex — process-shared pthread_mutex_t in shared memory
// ---------------------------------------------------------------------------

pub struct PlatformMutex {
    cached: Arc<CachedShm>,
    name: String,
}

impl PlatformMutex {
    /// Open (or create) a named inter-process mutex.
    ///
    /// The mutex lives inside a shared memory segment named after it. On
    /// first creation it is initialised with PTHREAD_PROCESS_SHARED and,
    /// where available, PTHREAD_MUTEX_ROBUST attributes.
    pub fn open(name: &str) -> io::Result<Self> {
        let shm_size = std::mem::size_of::<libc::pthread_mutex_t>();
        let cached = cached_shm_acquire(mutex_cache(), name, shm_size, |base| {
            let mtx_ptr = base as *mut libc::pthread_mutex_t;
            unsafe {
                ptr::write_bytes(mtx_ptr, 0, 1);
                let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
                let mut eno = libc::pthread_mutexattr_init(&mut attr);
                if eno != 0 {
                    return Err(io::Error::from_raw_os_error(eno));
                }
                eno = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
                if eno != 0 {
                    libc::pthread_mutexattr_destroy(&mut attr);
                    return Err(io::Error::from_raw_os_error(eno));
                }
                #[cfg(not(target_os = "macos"))]
                {
                    eno = pthread_mutexattr_setrobust(&mut attr, PTHREAD_MUTEX_ROBUST);
                    if eno != 0 {
                        libc::pthread_mutexattr_destroy(&mut attr);
                        return Err(io::Error::from_raw_os_error(eno));
                    }
                }
                eno = libc::pthread_mutex_init(mtx_ptr, &attr);
                libc::pthread_mutexattr_destroy(&mut attr);
                if eno != 0 {
                    return Err(io::Error::from_raw_os_error(eno));
                }
            }
            Ok(())
        })?;

        Ok(Self {
            cached,
            name: name.to_string(),
        })
    }

    fn mtx_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.cached.shm.as_mut_ptr() as *mut libc::pthread_mutex_t
    }

    /// Lock the mutex (blocking). Handles EOWNERDEAD from robust mutexes by
    /// calling pthread_mutex_consistent and returning success.
    pub fn lock(&self) -> io::Result<()> {
        let eno = unsafe { libc::pthread_mutex_lock(self.mtx_ptr()) };
        match eno {
            0 => Ok(()),
            #[cfg(not(target_os = "macos"))]
            EOWNERDEAD => {
                let eno2 = unsafe { pthread_mutex_consistent(self.mtx_ptr()) };
                if eno2 != 0 {
                    return Err(io::Error::from_raw_os_error(eno2));
                }
                Ok(())
            }
            _ => Err(io::Error::from_raw_os_error(eno)),
        }
    }

    /// Unlock the mutex.
    pub fn unlock(&self) -> io::Result<()> {
        let eno = unsafe { libc::pthread_mutex_unlock(self.mtx_ptr()) };
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    }

    /// Remove the shared memory backing a named mutex (static helper).
    /// Also purges any cached entry so a subsequent `open` creates fresh state.
    pub fn clear_storage(name: &str) {
        cached_shm_purge(mutex_cache(), name);
        PlatformShm::unlink_by_name(name);
    }
}

impl Drop for PlatformMutex {
    fn drop(&mut self) {
        // No pthread_mutex_destroy here. On macOS the virtual address may be
        // recycled to a different shm segment after munmap, and destroy would
        // corrupt whatever mutex now lives at that address. The munmap +
        // unlink in PlatformShm::Drop reclaims the memory.
        cached_shm_release(mutex_cache(), &self.name);
    }
}

// ---------------------------------------------------------------------------
// PlatformEvent — manual-reset event emulated with a process-shared
// pthread mutex + condition variable + flag word in shared memory.
// Initially set ("idle"). Probing does not consume the signal; only
// test_and_reset / wait_and_reset do.
// ---------------------------------------------------------------------------

#[repr(C)]
struct EventState {
    lock: libc::pthread_mutex_t,
    cond: libc::pthread_cond_t,
    signaled: u32,
}

pub struct PlatformEvent {
    cached: Arc<CachedShm>,
    name: String,
}

impl PlatformEvent {
    /// Open (or create) a named manual-reset event, initially set.
    pub fn open(name: &str) -> io::Result<Self> {
        let shm_size = std::mem::size_of::<EventState>();
        let cached = cached_shm_acquire(event_cache(), name, shm_size, |base| {
            let st = base as *mut EventState;
            unsafe {
                ptr::write_bytes(st, 0, 1);

                let mut mattr: libc::pthread_mutexattr_t = std::mem::zeroed();
                let mut eno = libc::pthread_mutexattr_init(&mut mattr);
                if eno != 0 {
                    return Err(io::Error::from_raw_os_error(eno));
                }
                eno = libc::pthread_mutexattr_setpshared(&mut mattr, libc::PTHREAD_PROCESS_SHARED);
                if eno == 0 {
                    eno = libc::pthread_mutex_init(&mut (*st).lock, &mattr);
                }
                libc::pthread_mutexattr_destroy(&mut mattr);
                if eno != 0 {
                    return Err(io::Error::from_raw_os_error(eno));
                }

                let mut cattr: libc::pthread_condattr_t = std::mem::zeroed();
                eno = libc::pthread_condattr_init(&mut cattr);
                if eno != 0 {
                    return Err(io::Error::from_raw_os_error(eno));
                }
                eno = libc::pthread_condattr_setpshared(&mut cattr, libc::PTHREAD_PROCESS_SHARED);
                if eno == 0 {
                    eno = libc::pthread_cond_init(&mut (*st).cond, &cattr);
                }
                libc::pthread_condattr_destroy(&mut cattr);
                if eno != 0 {
                    return Err(io::Error::from_raw_os_error(eno));
                }

                // Events start signaled: the region is idle until claimed.
                (*st).signaled = 1;
            }
            Ok(())
        })?;

        Ok(Self {
            cached,
            name: name.to_string(),
        })
    }

    fn state(&self) -> *mut EventState {
        self.cached.shm.as_mut_ptr() as *mut EventState
    }

    /// Probe the signal without consuming it.
    pub fn is_set(&self) -> io::Result<bool> {
        let st = self.state();
        unsafe {
            let eno = libc::pthread_mutex_lock(&mut (*st).lock);
            if eno != 0 {
                return Err(io::Error::from_raw_os_error(eno));
            }
            let set = (*st).signaled != 0;
            libc::pthread_mutex_unlock(&mut (*st).lock);
            Ok(set)
        }
    }

    /// If the event is set, clear it and return `true`; otherwise return
    /// `false` without blocking. Probe and clear are one atomic step.
    pub fn test_and_reset(&self) -> io::Result<bool> {
        let st = self.state();
        unsafe {
            let eno = libc::pthread_mutex_lock(&mut (*st).lock);
            if eno != 0 {
                return Err(io::Error::from_raw_os_error(eno));
            }
            let was_set = (*st).signaled != 0;
            (*st).signaled = 0;
            libc::pthread_mutex_unlock(&mut (*st).lock);
            Ok(was_set)
        }
    }

    /// Block until the event is set, then clear it.
    pub fn wait_and_reset(&self) -> io::Result<()> {
        let st = self.state();
        unsafe {
            let eno = libc::pthread_mutex_lock(&mut (*st).lock);
            if eno != 0 {
                return Err(io::Error::from_raw_os_error(eno));
            }
            while (*st).signaled == 0 {
                let eno = libc::pthread_cond_wait(&mut (*st).cond, &mut (*st).lock);
                if eno != 0 {
                    libc::pthread_mutex_unlock(&mut (*st).lock);
                    return Err(io::Error::from_raw_os_error(eno));
                }
            }
            (*st).signaled = 0;
            libc::pthread_mutex_unlock(&mut (*st).lock);
            Ok(())
        }
    }

    /// Set the event, waking all waiters.
    pub fn set(&self) -> io::Result<()> {
        let st = self.state();
        unsafe {
            let eno = libc::pthread_mutex_lock(&mut (*st).lock);
            if eno != 0 {
                return Err(io::Error::from_raw_os_error(eno));
            }
            (*st).signaled = 1;
            libc::pthread_cond_broadcast(&mut (*st).cond);
            libc::pthread_mutex_unlock(&mut (*st).lock);
            Ok(())
        }
    }

    /// Remove the shared memory backing a named event (static helper).
    pub fn clear_storage(name: &str) {
        cached_shm_purge(event_cache(), name);
        PlatformShm::unlink_by_name(name);
    }
}

impl Drop for PlatformEvent {
    fn drop(&mut self) {
        // Same rationale as PlatformMutex: no pthread destroy calls on
        // shm-backed state; munmap + unlink reclaims it.
        cached_shm_release(event_cache(), &self.name);
    }
}

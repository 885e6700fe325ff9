// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// Windows implementation of the named shared memory, mutex, and idle-event
// primitives. Shared memory is a pagefile-backed file mapping; the mutex and
// event are kernel objects, reference-counted by the kernel, so there is no
// backing storage to clear.

use std::io;
use std::ptr;

/// Encode a name as a null-terminated wide string for Win32 APIs.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

// ---------------------------------------------------------------------------
// PlatformShm — named file mapping (create-or-open)
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    handle: windows_sys::Win32::Foundation::HANDLE,
    mem: *mut u8,
    user_size: usize,
}

unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    /// Acquire a named shared memory region of `user_size` bytes, creating
    /// it if it does not yet exist. A fresh mapping is zero-filled.
    pub fn acquire(name: &str, user_size: usize) -> io::Result<Self> {
        use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
        use windows_sys::Win32::System::Memory::{
            CreateFileMappingW, MapViewOfFile, FILE_MAP_ALL_ACCESS, PAGE_READWRITE, SEC_COMMIT,
        };

        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if user_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let wide_name = to_wide(name);
        let handle = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                ptr::null(),
                PAGE_READWRITE | SEC_COMMIT,
                0,
                user_size as u32,
                wide_name.as_ptr(),
            )
        };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }

        let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
        if view.Value.is_null() {
            let e = io::Error::last_os_error();
            unsafe { windows_sys::Win32::Foundation::CloseHandle(handle) };
            return Err(e);
        }

        Ok(Self {
            handle,
            mem: view.Value as *mut u8,
            user_size,
        })
    }

    /// Mutable pointer to the mapped region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// User-requested size.
    pub fn user_size(&self) -> usize {
        self.user_size
    }

    /// No backing file on Windows; the kernel drops the object with its
    /// last handle.
    pub fn unlink_by_name(_name: &str) {}
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Memory::{
            UnmapViewOfFile, MEMORY_MAPPED_VIEW_ADDRESS,
        };

        if !self.mem.is_null() {
            let view = MEMORY_MAPPED_VIEW_ADDRESS {
                Value: self.mem as *mut _,
            };
            unsafe { UnmapViewOfFile(view) };
        }
        if !self.handle.is_null() {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformMutex — named kernel mutex
// ---------------------------------------------------------------------------

pub struct PlatformMutex {
    handle: windows_sys::Win32::Foundation::HANDLE,
}

unsafe impl Send for PlatformMutex {}
unsafe impl Sync for PlatformMutex {}

impl PlatformMutex {
    /// Open (or create) a named kernel mutex.
    pub fn open(name: &str) -> io::Result<Self> {
        use windows_sys::Win32::Foundation::FALSE;
        use windows_sys::Win32::System::Threading::CreateMutexW;

        let wide_name = to_wide(name);
        let h = unsafe { CreateMutexW(ptr::null(), FALSE, wide_name.as_ptr()) };
        if h.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { handle: h })
    }

    /// Lock the mutex (blocking). WAIT_ABANDONED (previous owner died) is
    /// treated as an acquired lock, matching the robust-mutex recovery on
    /// POSIX.
    pub fn lock(&self) -> io::Result<()> {
        use windows_sys::Win32::Foundation::{WAIT_ABANDONED, WAIT_OBJECT_0};
        use windows_sys::Win32::System::Threading::{WaitForSingleObject, INFINITE};

        let ret = unsafe { WaitForSingleObject(self.handle, INFINITE) };
        match ret {
            WAIT_OBJECT_0 | WAIT_ABANDONED => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Unlock the mutex.
    pub fn unlock(&self) -> io::Result<()> {
        use windows_sys::Win32::System::Threading::ReleaseMutex;

        if unsafe { ReleaseMutex(self.handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Kernel objects need no storage cleanup.
    pub fn clear_storage(_name: &str) {}
}

impl Drop for PlatformMutex {
    fn drop(&mut self) {
        use windows_sys::Win32::Foundation::CloseHandle;
        if !self.handle.is_null() {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformEvent — named manual-reset kernel event, initially set
// ---------------------------------------------------------------------------

pub struct PlatformEvent {
    handle: windows_sys::Win32::Foundation::HANDLE,
}

unsafe impl Send for PlatformEvent {}
unsafe impl Sync for PlatformEvent {}

impl PlatformEvent {
    /// Open a named manual-reset event; create it signaled if it does not
    /// exist yet. Open-then-create keeps the initial state of an already
    /// published event intact.
    pub fn open(name: &str) -> io::Result<Self> {
        use windows_sys::Win32::Foundation::{ERROR_FILE_NOT_FOUND, FALSE, TRUE};
        use windows_sys::Win32::System::Threading::{CreateEventW, OpenEventW, EVENT_ALL_ACCESS};

        let wide_name = to_wide(name);
        let mut h = unsafe { OpenEventW(EVENT_ALL_ACCESS, FALSE, wide_name.as_ptr()) };
        if h.is_null() {
            let e = io::Error::last_os_error();
            if e.raw_os_error() != Some(ERROR_FILE_NOT_FOUND as i32) {
                return Err(e);
            }
            // Manual reset, initially signaled: the region is idle until claimed.
            h = unsafe { CreateEventW(ptr::null(), TRUE, TRUE, wide_name.as_ptr()) };
            if h.is_null() {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(Self { handle: h })
    }

    /// Probe the signal without consuming it (manual-reset events stay set
    /// across a satisfied wait).
    pub fn is_set(&self) -> io::Result<bool> {
        use windows_sys::Win32::Foundation::WAIT_OBJECT_0;
        use windows_sys::Win32::System::Threading::WaitForSingleObject;

        let ret = unsafe { WaitForSingleObject(self.handle, 0) };
        Ok(ret == WAIT_OBJECT_0)
    }

    /// If the event is set, clear it and return `true`; otherwise `false`
    /// without blocking.
    pub fn test_and_reset(&self) -> io::Result<bool> {
        use windows_sys::Win32::Foundation::WAIT_OBJECT_0;
        use windows_sys::Win32::System::Threading::{ResetEvent, WaitForSingleObject};

        let ret = unsafe { WaitForSingleObject(self.handle, 0) };
        if ret != WAIT_OBJECT_0 {
            return Ok(false);
        }
        if unsafe { ResetEvent(self.handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(true)
    }

    /// Block until the event is set, then clear it.
    pub fn wait_and_reset(&self) -> io::Result<()> {
        use windows_sys::Win32::Foundation::WAIT_OBJECT_0;
        use windows_sys::Win32::System::Threading::{ResetEvent, WaitForSingleObject, INFINITE};

        let ret = unsafe { WaitForSingleObject(self.handle, INFINITE) };
        if ret != WAIT_OBJECT_0 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { ResetEvent(self.handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Set the event, releasing anyone waiting on it.
    pub fn set(&self) -> io::Result<()> {
        use windows_sys::Win32::System::Threading::SetEvent;

        if unsafe { SetEvent(self.handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Kernel objects need no storage cleanup.
    pub fn clear_storage(_name: &str) {}
}

impl Drop for PlatformEvent {
    fn drop(&mut self) {
        use windows_sys::Win32::Foundation::CloseHandle;
        if !self.handle.is_null() {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

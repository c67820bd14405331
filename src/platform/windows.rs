// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Windows named mutex: a kernel mutex object from CreateMutexW.

use std::io;
use std::ptr;

use windows_sys::Win32::Foundation::{
    CloseHandle, FALSE, HANDLE, WAIT_ABANDONED, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Threading::{
    CreateMutexW, ReleaseMutex, WaitForSingleObject, INFINITE,
};

use super::{NamedLock, Wait, WaitStatus};

/// Encode a name as a null-terminated wide string for Win32 APIs.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Milliseconds for WaitForSingleObject, kept below INFINITE.
fn wait_millis(wait: Wait) -> u32 {
    match wait {
        Wait::Forever => INFINITE,
        Wait::Poll => 0,
        Wait::Millis(ms) => ms.min((INFINITE - 1) as u64) as u32,
    }
}

pub struct PlatformMutex {
    handle: HANDLE,
}

// Safety: a kernel handle may be used from any thread; ownership of the
// mutex itself is tracked per thread by the kernel.
unsafe impl Send for PlatformMutex {}
unsafe impl Sync for PlatformMutex {}

impl NamedLock for PlatformMutex {
    fn create(name: &str) -> io::Result<Self> {
        let wide_name = to_wide(name);
        // An existing mutex is opened; a different object type under this
        // name fails with ERROR_INVALID_HANDLE.
        let h = unsafe { CreateMutexW(ptr::null(), FALSE, wide_name.as_ptr()) };
        if h.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { handle: h })
    }

    fn wait(&self, wait: Wait) -> WaitStatus {
        let ret = unsafe { WaitForSingleObject(self.handle, wait_millis(wait)) };
        match ret {
            WAIT_OBJECT_0 => WaitStatus::Acquired,
            WAIT_ABANDONED => WaitStatus::Abandoned,
            WAIT_TIMEOUT => WaitStatus::TimedOut,
            WAIT_FAILED => WaitStatus::Failed(io::Error::last_os_error()),
            other => WaitStatus::Failed(io::Error::new(
                io::ErrorKind::Other,
                format!("unexpected wait result {other:#x}"),
            )),
        }
    }

    fn signal(&self) -> io::Result<()> {
        if unsafe { ReleaseMutex(self.handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn close(mut self) -> io::Result<()> {
        let h = std::mem::replace(&mut self.handle, ptr::null_mut());
        if unsafe { CloseHandle(h) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn clear_storage(_name: &str) {
        // Kernel objects vanish with their last handle.
    }
}

impl Drop for PlatformMutex {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

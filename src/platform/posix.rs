// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX named mutex: a process-shared, robust, error-checking
// pthread_mutex_t stored in a POSIX shared memory object.

use std::collections::HashMap;
use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use super::{NamedLock, Wait, WaitStatus};
use crate::mutex_name;

// ---------------------------------------------------------------------------
// Process-local shm cache.
// All handles within one process that open the same name MUST use the same
// mmap. macOS's pthread implementation stores internal pointers relative to
// the virtual address used for pthread_mutex_init, so a second mapping of the
// same page at another address makes pthread_mutex_lock fail with EINVAL.
// ---------------------------------------------------------------------------

struct CachedShm {
    shm: PlatformShm,
    local_ref: AtomicUsize,
}

type ShmCache = HashMap<String, Arc<CachedShm>>;

fn mutex_cache() -> &'static Mutex<ShmCache> {
    static CACHE: OnceLock<Mutex<ShmCache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Acquire or reuse a cached shm handle.
///
/// On the first open of `name` system-wide, `init_fn` runs with the shm
/// pointer **while the cache lock is still held**, so no other thread of this
/// process can use the handle before initialisation completes.
fn cached_shm_acquire<F>(name: &str, size: usize, init_fn: F) -> io::Result<Arc<CachedShm>>
where
    F: FnOnce(*mut u8) -> io::Result<()>,
{
    let mut cache = mutex_cache().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(entry) = cache.get(name) {
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
    cache.insert(name.to_string(), Arc::clone(&entry));
    Ok(entry)
}

/// Release one local reference. The last one removes the cache entry.
/// An entry replaced after `clear_storage` is left alone.
fn cached_shm_release(name: &str, cached: &Arc<CachedShm>) {
    let mut cache = mutex_cache().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(entry) = cache.get(name) {
        if !Arc::ptr_eq(entry, cached) {
            return;
        }
        if entry.local_ref.fetch_sub(1, Ordering::AcqRel) <= 1 {
            cache.remove(name);
        }
    }
}

// ---------------------------------------------------------------------------
// Robust mutex symbols, not exposed by `libc` on every target.
// macOS has no robust mutexes, so abandonment cannot be detected there.
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
    fn pthread_mutex_timedlock(
        mutex: *mut libc::pthread_mutex_t,
        abstime: *const libc::timespec,
    ) -> libc::c_int;
}

#[cfg(not(target_os = "macos"))]
const PTHREAD_MUTEX_ROBUST: libc::c_int = 1;

// ---------------------------------------------------------------------------
// Layout: user region rounded up to 4 bytes, then a trailing atomic<i32>
// reference counter shared by every process mapping the segment.
// ---------------------------------------------------------------------------

const ALIGN: usize = std::mem::align_of::<AtomicI32>();

fn calc_size(user_size: usize) -> usize {
    let aligned = ((user_size.wrapping_sub(1) / ALIGN) + 1) * ALIGN;
    aligned + std::mem::size_of::<AtomicI32>()
}

/// # Safety
/// `mem` must point to a valid mapped region of at least `total_size` bytes.
unsafe fn acc_of<'a>(mem: *mut u8, total_size: usize) -> &'a AtomicI32 {
    let offset = total_size - std::mem::size_of::<AtomicI32>();
    &*(mem.add(offset) as *const AtomicI32)
}

// ---------------------------------------------------------------------------
// PlatformShm
// ---------------------------------------------------------------------------

struct PlatformShm {
    mem: *mut u8,
    size: usize,  // total mapped size (including ref counter)
    name: String, // POSIX name (with leading '/')
    prev_ref: i32,
}

// Safety: the region is process-shared; all access goes through the
// pthread mutex stored in it or the atomic ref counter.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    /// Create the segment, or open it if it already exists.
    fn acquire(name: &str, user_size: usize) -> io::Result<Self> {
        let posix_name = mutex_name::posix_name(name);
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let perms: libc::mode_t = 0o666;
        let total_size = calc_size(user_size);

        // Exclusive create first so ftruncate only runs on a segment we own.
        // On macOS, ftruncate on an already-sized object can zero it.
        let created = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                perms as libc::c_uint,
            )
        };
        let (fd, need_truncate) = if created != -1 {
            (created, true)
        } else {
            let e = io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::EEXIST) {
                return Err(e);
            }
            let opened =
                unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, perms as libc::c_uint) };
            if opened == -1 {
                return Err(io::Error::last_os_error());
            }
            if let Err(e) = wait_for_size(opened, total_size) {
                unsafe { libc::close(opened) };
                return Err(e);
            }
            (opened, false)
        };

        unsafe { libc::fchmod(fd, perms) };

        if need_truncate {
            let ret = unsafe { libc::ftruncate(fd, total_size as libc::off_t) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
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
            name: posix_name,
            prev_ref: prev,
        })
    }

    fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// 0 if this handle was the first to map the segment.
    fn prev_ref_count(&self) -> i32 {
        self.prev_ref
    }

    fn unlink_by_posix_name(posix_name: &str) {
        if let Ok(c_name) = CString::new(posix_name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

/// How long an opener waits for a concurrent creator to `ftruncate`.
const SIZE_RETRIES: u32 = 100;

/// Block until the object behind `fd` holds at least `total_size` bytes.
/// An object that stays shorter was not made by us; mapping it would fault
/// on first touch, so it is reported as `EINVAL`.
fn wait_for_size(fd: libc::c_int, total_size: usize) -> io::Result<()> {
    for _ in 0..SIZE_RETRIES {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } != 0 {
            return Err(io::Error::last_os_error());
        }
        if st.st_size >= total_size as libc::off_t {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(1));
    }
    Err(io::Error::from_raw_os_error(libc::EINVAL))
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        // Last mapping anywhere also removes the name. Not atomic with a
        // concurrent shm_open elsewhere: that opener may map an object which
        // is unlinked right after, and a later creator then starts a new one.
        let prev = unsafe { acc_of(self.mem, self.size).fetch_sub(1, Ordering::AcqRel) };
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        if prev <= 1 {
            Self::unlink_by_posix_name(&self.name);
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformMutex
// ---------------------------------------------------------------------------

pub struct PlatformMutex {
    cached: Arc<CachedShm>,
    name: String,
}

/// Set up `attr` and initialise the mutex at `base`.
///
/// # Safety
/// `base` must point to writable shared memory large enough for a
/// `pthread_mutex_t` that no thread is using yet.
unsafe fn init_mutex(base: *mut u8) -> io::Result<()> {
    let mtx_ptr = base as *mut libc::pthread_mutex_t;
    ptr::write_bytes(mtx_ptr, 0, 1);

    let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
    let mut eno = libc::pthread_mutexattr_init(&mut attr);
    if eno != 0 {
        return Err(io::Error::from_raw_os_error(eno));
    }

    let result = (|| {
        eno = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        // Same-thread relock reports EDEADLK instead of hanging; unlock by a
        // non-owner reports EPERM.
        eno = libc::pthread_mutexattr_settype(&mut attr, libc::PTHREAD_MUTEX_ERRORCHECK);
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        #[cfg(not(target_os = "macos"))]
        {
            eno = pthread_mutexattr_setrobust(&mut attr, PTHREAD_MUTEX_ROBUST);
            if eno != 0 {
                return Err(io::Error::from_raw_os_error(eno));
            }
        }
        eno = libc::pthread_mutex_init(mtx_ptr, &attr);
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    })();

    libc::pthread_mutexattr_destroy(&mut attr);
    result
}

impl PlatformMutex {
    fn mtx_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.cached.shm.as_mut_ptr() as *mut libc::pthread_mutex_t
    }

    /// Map a pthread return code to a wait status.
    fn status(&self, eno: libc::c_int) -> WaitStatus {
        match eno {
            0 => WaitStatus::Acquired,
            libc::EBUSY | libc::ETIMEDOUT => WaitStatus::TimedOut,
            #[cfg(not(target_os = "macos"))]
            EOWNERDEAD => {
                // We own it now; mark it usable again for later lockers.
                let eno2 = unsafe { pthread_mutex_consistent(self.mtx_ptr()) };
                if eno2 != 0 {
                    unsafe { libc::pthread_mutex_unlock(self.mtx_ptr()) };
                    return WaitStatus::Failed(io::Error::from_raw_os_error(eno2));
                }
                WaitStatus::Abandoned
            }
            _ => WaitStatus::Failed(io::Error::from_raw_os_error(eno)),
        }
    }

    fn lock(&self) -> WaitStatus {
        let eno = unsafe { libc::pthread_mutex_lock(self.mtx_ptr()) };
        self.status(eno)
    }

    fn try_lock(&self) -> WaitStatus {
        let eno = unsafe { libc::pthread_mutex_trylock(self.mtx_ptr()) };
        // Robust error-checking mutexes report a relock by the owning thread
        // as EDEADLK even on trylock. For a poll that is just "busy".
        if eno == libc::EDEADLK {
            return WaitStatus::TimedOut;
        }
        self.status(eno)
    }

    #[cfg(not(target_os = "macos"))]
    fn lock_timeout(&self, timeout_ms: u64) -> WaitStatus {
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
        let ns_total = ts.tv_nsec as u64 + (timeout_ms % 1000) * 1_000_000;
        ts.tv_sec = ts.tv_sec.saturating_add(
            (timeout_ms / 1000 + ns_total / 1_000_000_000).min(libc::time_t::MAX as u64)
                as libc::time_t,
        );
        ts.tv_nsec = (ns_total % 1_000_000_000) as libc::c_long;
        loop {
            let eno = unsafe { pthread_mutex_timedlock(self.mtx_ptr(), &ts) };
            match eno {
                libc::EINTR => continue,
                // Held by this thread through another instance. Nothing can
                // free it while we wait, so the wait runs out.
                libc::EDEADLK => {
                    thread::sleep(Duration::from_millis(timeout_ms));
                    return WaitStatus::TimedOut;
                }
                _ => return self.status(eno),
            }
        }
    }

    // macOS lacks pthread_mutex_timedlock: poll trylock with backoff.
    #[cfg(target_os = "macos")]
    fn lock_timeout(&self, timeout_ms: u64) -> WaitStatus {
        use std::time::Instant;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut k = 0u32;
        loop {
            match self.try_lock() {
                WaitStatus::TimedOut => {}
                other => return other,
            }
            if Instant::now() >= deadline {
                return WaitStatus::TimedOut;
            }
            backoff(&mut k);
        }
    }
}

/// Busy spin, then CPU pause hints, then yields, then 1ms sleeps.
#[cfg(target_os = "macos")]
fn backoff(k: &mut u32) {
    if *k < 4 {
    } else if *k < 16 {
        std::hint::spin_loop();
    } else if *k < 32 {
        thread::yield_now();
    } else {
        thread::sleep(Duration::from_millis(1));
        return;
    }
    *k += 1;
}

impl NamedLock for PlatformMutex {
    /// The mutex is initialised by whichever process maps the segment first.
    fn create(name: &str) -> io::Result<Self> {
        let shm_size = std::mem::size_of::<libc::pthread_mutex_t>();
        let cached = cached_shm_acquire(name, shm_size, |base| unsafe { init_mutex(base) })?;
        Ok(Self {
            cached,
            name: name.to_string(),
        })
    }

    fn wait(&self, wait: Wait) -> WaitStatus {
        match wait {
            Wait::Forever => self.lock(),
            Wait::Poll => self.try_lock(),
            Wait::Millis(ms) => self.lock_timeout(ms),
        }
    }

    fn signal(&self) -> io::Result<()> {
        let eno = unsafe { libc::pthread_mutex_unlock(self.mtx_ptr()) };
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    }

    fn close(self) -> io::Result<()> {
        drop(self);
        Ok(())
    }

    /// Unlink the segment. Handles still open keep their mapping, but the
    /// next `create` gets fresh state.
    fn clear_storage(name: &str) {
        mutex_cache()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        PlatformShm::unlink_by_posix_name(&mutex_name::posix_name(name));
    }
}

impl Drop for PlatformMutex {
    fn drop(&mut self) {
        // No pthread_mutex_destroy: other processes may still use the
        // mutex, and on macOS the address may be recycled after munmap.
        cached_shm_release(&self.name, &self.cached);
    }
}

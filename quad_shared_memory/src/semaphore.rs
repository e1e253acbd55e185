//! Named POSIX counting semaphores.
//!
//! Thin wrapper over `sem_open` and friends. Post/wait pairs give
//! acquire/release ordering between processes, which is what makes plain
//! (non-atomic) access to the shared region safe across turns.

use crate::error::{ShmError, ShmResult};
use crate::platform::validate_name;
use nix::errno::Errno;
use std::ffi::CString;
use std::ptr::NonNull;
use std::time::Duration;
use tracing::{debug, warn};

/// Permissions for newly created semaphores.
const SEMAPHORE_MODE: libc::c_uint = 0o644;

/// An open named semaphore.
///
/// Dropping closes the local handle; the name stays until [`NamedSemaphore::unlink`].
pub struct NamedSemaphore {
    sem: NonNull<libc::sem_t>,
    name: String,
}

// SAFETY: POSIX semaphores are designed for concurrent use from any thread.
unsafe impl Send for NamedSemaphore {}
// SAFETY: see above; every operation goes through the thread-safe sem_* API.
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Create a semaphore with value 0.
    ///
    /// A stale semaphore of the same name is unlinked and the creation
    /// retried once.
    pub fn create(name: &str) -> ShmResult<Self> {
        Self::create_with(name, true)
    }

    /// Create a semaphore with value 0, failing with
    /// [`ShmError::SemaphoreExists`] if the name is taken.
    pub fn create_exclusive(name: &str) -> ShmResult<Self> {
        Self::create_with(name, false)
    }

    fn create_with(name: &str, overwrite: bool) -> ShmResult<Self> {
        let c_name = c_name(name)?;
        let open = || {
            // SAFETY: c_name is a valid NUL-terminated string; the variadic
            // arguments are the mode and initial value required by O_CREAT.
            unsafe {
                libc::sem_open(
                    c_name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL,
                    SEMAPHORE_MODE,
                    0 as libc::c_uint,
                )
            }
        };

        let mut sem = open();
        if sem == libc::SEM_FAILED && Errno::last() == Errno::EEXIST {
            if !overwrite {
                return Err(ShmError::SemaphoreExists {
                    name: name.to_string(),
                });
            }
            warn!(name, "Semaphore already exists, reclaiming it");
            Self::unlink(name)?;
            sem = open();
        }
        if sem == libc::SEM_FAILED {
            return Err(sem_error(name, "sem_open", Errno::last()));
        }

        debug!(name, "Semaphore created");
        Self::from_raw(name, sem)
    }

    /// Open an existing semaphore.
    pub fn open(name: &str) -> ShmResult<Self> {
        let c_name = c_name(name)?;
        // SAFETY: c_name is a valid NUL-terminated string.
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return match Errno::last() {
                Errno::ENOENT => Err(ShmError::SemaphoreNotFound {
                    name: name.to_string(),
                }),
                errno => Err(sem_error(name, "sem_open", errno)),
            };
        }
        debug!(name, "Semaphore opened");
        Self::from_raw(name, sem)
    }

    fn from_raw(name: &str, sem: *mut libc::sem_t) -> ShmResult<Self> {
        let sem = NonNull::new(sem).ok_or_else(|| sem_error(name, "sem_open", Errno::EINVAL))?;
        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    /// Remove a semaphore name. A missing name is not an error.
    pub fn unlink(name: &str) -> ShmResult<()> {
        let c_name = c_name(name)?;
        // SAFETY: c_name is a valid NUL-terminated string.
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
            return Ok(());
        }
        match Errno::last() {
            Errno::ENOENT => Ok(()),
            errno => Err(sem_error(name, "sem_unlink", errno)),
        }
    }

    /// Semaphore name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Increment the value, waking one waiter.
    pub fn post(&self) -> ShmResult<()> {
        // SAFETY: sem is an open semaphore handle owned by self.
        if unsafe { libc::sem_post(self.sem.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(sem_error(&self.name, "sem_post", Errno::last()))
        }
    }

    /// Block until the value is positive, then decrement it.
    pub fn wait(&self) -> ShmResult<()> {
        loop {
            // SAFETY: sem is an open semaphore handle owned by self.
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(sem_error(&self.name, "sem_wait", errno)),
            }
        }
    }

    /// Decrement if the value is positive. Returns `false` instead of blocking.
    pub fn try_wait(&self) -> ShmResult<bool> {
        loop {
            // SAFETY: sem is an open semaphore handle owned by self.
            if unsafe { libc::sem_trywait(self.sem.as_ptr()) } == 0 {
                return Ok(true);
            }
            match Errno::last() {
                Errno::EAGAIN => return Ok(false),
                Errno::EINTR => continue,
                errno => return Err(sem_error(&self.name, "sem_trywait", errno)),
            }
        }
    }

    /// Wait at most `timeout`. Returns `false` if the wait timed out.
    #[cfg(target_os = "linux")]
    pub fn wait_timeout(&self, timeout: Duration) -> ShmResult<bool> {
        use nix::sys::time::TimeSpec;
        use nix::time::{ClockId, clock_gettime};

        // sem_timedwait takes an absolute CLOCK_REALTIME deadline.
        let deadline = clock_gettime(ClockId::CLOCK_REALTIME)? + TimeSpec::from(timeout);
        loop {
            // SAFETY: sem is an open semaphore handle; deadline outlives the call.
            if unsafe { libc::sem_timedwait(self.sem.as_ptr(), deadline.as_ref()) } == 0 {
                return Ok(true);
            }
            match Errno::last() {
                Errno::ETIMEDOUT => return Ok(false),
                Errno::EINTR => continue,
                errno => return Err(sem_error(&self.name, "sem_timedwait", errno)),
            }
        }
    }

    /// Wait at most `timeout`. Returns `false` if the wait timed out.
    #[cfg(not(target_os = "linux"))]
    pub fn wait_timeout(&self, timeout: Duration) -> ShmResult<bool> {
        let deadline = std::time::Instant::now() + timeout;
        let mut backoff = Duration::from_micros(50);
        loop {
            if self.try_wait()? {
                return Ok(true);
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            std::thread::sleep(backoff.min(deadline - now));
            backoff = (backoff * 2).min(Duration::from_millis(5));
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: sem was returned by sem_open and is closed exactly once.
        if unsafe { libc::sem_close(self.sem.as_ptr()) } != 0 {
            warn!(name = %self.name, "sem_close failed: {}", Errno::last());
        }
    }
}

impl std::fmt::Debug for NamedSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedSemaphore").field("name", &self.name).finish()
    }
}

fn c_name(name: &str) -> ShmResult<CString> {
    validate_name(name)?;
    CString::new(name).map_err(|e| ShmError::InvalidName {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn sem_error(name: &str, operation: &'static str, source: Errno) -> ShmError {
    ShmError::Semaphore {
        name: name.to_string(),
        operation,
        source,
    }
}

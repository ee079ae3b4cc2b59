//! Named cross-process signals
//!
//! A signal behaves like an auto-reset event: raising an already raised
//! signal has no further effect, and a successful wait resets it.

use crate::config::validate_resource_name;
use crate::Result;
use std::time::Duration;
use tracing::debug;

/// Named signal shared with one peer process
pub struct NamedSignal {
    /// Signal name
    pub name: String,
    signal: PlatformSignal,
    is_creator: bool,
}

impl NamedSignal {
    /// Create the named signal in the unraised state (consumer side)
    pub fn create(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_resource_name(&name)?;

        let signal = create_platform_signal(&name)?;
        debug!("Created signal {}", name);

        Ok(Self {
            name,
            signal,
            is_creator: true,
        })
    }

    /// Attach to an existing signal (producer side)
    pub fn open(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_resource_name(&name)?;

        let signal = open_platform_signal(&name)?;
        debug!("Opened signal {}", name);

        Ok(Self {
            name,
            signal,
            is_creator: false,
        })
    }

    /// Raise the signal
    pub fn raise(&self) -> Result<()> {
        self.signal.raise()
    }

    /// Wait until raised. `Ok(false)` on timeout.
    pub fn wait(&self, timeout: Duration) -> Result<bool> {
        self.signal.wait(timeout)
    }
}

impl Drop for NamedSignal {
    fn drop(&mut self) {
        if self.is_creator {
            cleanup_platform_signal(&self.name);
        }
    }
}

impl std::fmt::Debug for NamedSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedSignal")
            .field("name", &self.name)
            .field("is_creator", &self.is_creator)
            .finish()
    }
}

// Platform-specific implementations

#[cfg(target_os = "linux")]
mod posix_impl {
    use crate::{ChannelError, Result};
    use nix::errno::Errno;
    use std::ffi::CString;
    use std::time::Duration;

    /// POSIX named semaphore capped at one pending raise
    pub struct PlatformSignal {
        sem: *mut libc::sem_t,
    }

    // Safety: sem_t operations are thread-safe and the handle is closed once on drop
    unsafe impl Send for PlatformSignal {}
    unsafe impl Sync for PlatformSignal {}

    fn sem_name(name: &str) -> Result<CString> {
        let name = if name.starts_with('/') {
            name.to_string()
        } else {
            format!("/{}", name)
        };
        CString::new(name).map_err(|_| ChannelError::InvalidName("name contains null byte".to_string()))
    }

    // glibc 2.30 and later; lets the wait run against the monotonic clock
    #[cfg(target_env = "gnu")]
    extern "C" {
        fn sem_clockwait(
            sem: *mut libc::sem_t,
            clock: libc::clockid_t,
            abstime: *const libc::timespec,
        ) -> libc::c_int;
    }

    #[cfg(target_env = "gnu")]
    const WAIT_CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;
    #[cfg(not(target_env = "gnu"))]
    const WAIT_CLOCK: libc::clockid_t = libc::CLOCK_REALTIME;

    unsafe fn timed_wait(sem: *mut libc::sem_t, deadline: &libc::timespec) -> libc::c_int {
        #[cfg(target_env = "gnu")]
        {
            sem_clockwait(sem, WAIT_CLOCK, deadline)
        }
        #[cfg(not(target_env = "gnu"))]
        {
            libc::sem_timedwait(sem, deadline)
        }
    }

    /// Absolute deadline on `WAIT_CLOCK`, saturating at the largest `time_t`
    pub(super) fn deadline(timeout: Duration) -> libc::timespec {
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        unsafe { libc::clock_gettime(WAIT_CLOCK, &mut ts) };

        let mut nanos = ts.tv_nsec as i64 + i64::from(timeout.subsec_nanos());
        let mut secs = i64::try_from(timeout.as_secs())
            .unwrap_or(i64::MAX)
            .saturating_add(ts.tv_sec as i64);
        if nanos >= 1_000_000_000 {
            secs = secs.saturating_add(1);
            nanos -= 1_000_000_000;
        }

        ts.tv_sec = libc::time_t::try_from(secs).unwrap_or(libc::time_t::MAX);
        ts.tv_nsec = nanos as _;
        ts
    }

    impl PlatformSignal {
        pub fn raise(&self) -> Result<()> {
            let mut value: libc::c_int = 0;
            if unsafe { libc::sem_getvalue(self.sem, &mut value) } == 0 && value > 0 {
                return Ok(());
            }

            if unsafe { libc::sem_post(self.sem) } != 0 {
                return Err(ChannelError::from_errno(Errno::last() as i32, "sem_post failed"));
            }
            Ok(())
        }

        pub fn wait(&self, timeout: Duration) -> Result<bool> {
            let deadline = deadline(timeout);
            loop {
                if unsafe { timed_wait(self.sem, &deadline) } == 0 {
                    return Ok(true);
                }
                match Errno::last() {
                    Errno::ETIMEDOUT => return Ok(false),
                    Errno::EINTR => continue,
                    errno => {
                        return Err(ChannelError::from_errno(errno as i32, "semaphore wait failed"))
                    }
                }
            }
        }
    }

    impl Drop for PlatformSignal {
        fn drop(&mut self) {
            unsafe { libc::sem_close(self.sem) };
        }
    }

    pub fn create_platform_signal(name: &str) -> Result<PlatformSignal> {
        let c_name = sem_name(name)?;
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                0o600 as libc::c_uint,
                0 as libc::c_uint,
            )
        };

        if sem == libc::SEM_FAILED {
            return Err(ChannelError::from_errno(
                Errno::last() as i32,
                format!("sem_open {} failed", name),
            ));
        }

        // Start unraised even if a stale semaphore survived a crashed consumer
        while unsafe { libc::sem_trywait(sem) } == 0 {}

        Ok(PlatformSignal { sem })
    }

    pub fn open_platform_signal(name: &str) -> Result<PlatformSignal> {
        let c_name = sem_name(name)?;
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };

        if sem == libc::SEM_FAILED {
            return Err(ChannelError::from_errno(
                Errno::last() as i32,
                format!("sem_open {} failed", name),
            ));
        }

        Ok(PlatformSignal { sem })
    }

    pub fn cleanup_platform_signal(name: &str) {
        if let Ok(c_name) = sem_name(name) {
            unsafe { libc::sem_unlink(c_name.as_ptr()) };
        }
    }
}

#[cfg(windows)]
mod windows_impl {
    use crate::{ChannelError, Result};
    use std::ffi::CString;
    use std::time::Duration;
    use winapi::shared::minwindef::{DWORD, FALSE};
    use winapi::shared::winerror::WAIT_TIMEOUT;
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::synchapi::{CreateEventA, OpenEventA, SetEvent, WaitForSingleObject};
    use winapi::um::winbase::WAIT_OBJECT_0;
    use winapi::um::winnt::{EVENT_MODIFY_STATE, HANDLE, SYNCHRONIZE};

    /// Auto-reset event
    pub struct PlatformSignal {
        handle: HANDLE,
    }

    // Safety: event handles may be used from any thread
    unsafe impl Send for PlatformSignal {}
    unsafe impl Sync for PlatformSignal {}

    impl PlatformSignal {
        pub fn raise(&self) -> Result<()> {
            if unsafe { SetEvent(self.handle) } == 0 {
                return Err(ChannelError::Platform("SetEvent failed".to_string()));
            }
            Ok(())
        }

        pub fn wait(&self, timeout: Duration) -> Result<bool> {
            let millis = timeout.as_millis().min(DWORD::MAX as u128 - 1) as DWORD;
            match unsafe { WaitForSingleObject(self.handle, millis) } {
                WAIT_OBJECT_0 => Ok(true),
                WAIT_TIMEOUT => Ok(false),
                other => Err(ChannelError::Platform(format!(
                    "WaitForSingleObject returned {:#x}",
                    other
                ))),
            }
        }
    }

    impl Drop for PlatformSignal {
        fn drop(&mut self) {
            unsafe { CloseHandle(self.handle) };
        }
    }

    pub fn create_platform_signal(name: &str) -> Result<PlatformSignal> {
        let c_name = CString::new(name)
            .map_err(|_| ChannelError::InvalidName("name contains null byte".to_string()))?;

        let handle = unsafe { CreateEventA(std::ptr::null_mut(), FALSE, FALSE, c_name.as_ptr()) };
        if handle.is_null() {
            return Err(ChannelError::Platform(format!("CreateEvent {} failed", name)));
        }

        Ok(PlatformSignal { handle })
    }

    pub fn open_platform_signal(name: &str) -> Result<PlatformSignal> {
        let c_name = CString::new(name)
            .map_err(|_| ChannelError::InvalidName("name contains null byte".to_string()))?;

        let handle =
            unsafe { OpenEventA(EVENT_MODIFY_STATE | SYNCHRONIZE, FALSE, c_name.as_ptr()) };
        if handle.is_null() {
            return Err(ChannelError::ResourceNotFound(name.to_string()));
        }

        Ok(PlatformSignal { handle })
    }

    pub fn cleanup_platform_signal(_name: &str) {}
}

#[cfg(not(any(target_os = "linux", windows)))]
mod fallback_impl {
    use crate::{ChannelError, Result};
    use std::time::Duration;

    pub struct PlatformSignal(std::convert::Infallible);

    impl PlatformSignal {
        pub fn raise(&self) -> Result<()> {
            match self.0 {}
        }

        pub fn wait(&self, _timeout: Duration) -> Result<bool> {
            match self.0 {}
        }
    }

    pub fn create_platform_signal(_name: &str) -> Result<PlatformSignal> {
        Err(ChannelError::Unsupported)
    }

    pub fn open_platform_signal(_name: &str) -> Result<PlatformSignal> {
        Err(ChannelError::Unsupported)
    }

    pub fn cleanup_platform_signal(_name: &str) {}
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        use posix_impl::*;
    } else if #[cfg(windows)] {
        use windows_impl::*;
    } else {
        use fallback_impl::*;
    }
}

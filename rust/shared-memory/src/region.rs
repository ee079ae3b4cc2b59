//! Shared notification buffer

use crate::config::validate_resource_name;
use crate::Result;
use tracing::debug;

/// Mapped view of the named shared buffer
pub struct SharedBuffer {
    /// Buffer name
    pub name: String,
    /// Mapped size in bytes
    pub size: usize,
    view: PlatformView,
    /// Whether this process created the buffer
    is_creator: bool,
}

impl SharedBuffer {
    /// Create the named buffer (consumer side)
    pub fn create(name: impl Into<String>, size: usize) -> Result<Self> {
        let name = name.into();
        validate_resource_name(&name)?;

        let view = create_platform_buffer(&name, size)?;
        debug!("Created shared buffer {} ({} bytes)", name, size);

        Ok(Self {
            name,
            size,
            view,
            is_creator: true,
        })
    }

    /// Map an existing buffer of at least `size` bytes (producer side)
    pub fn open(name: impl Into<String>, size: usize) -> Result<Self> {
        let name = name.into();
        validate_resource_name(&name)?;

        let view = open_platform_buffer(&name, size)?;
        debug!("Opened shared buffer {} ({} bytes)", name, size);

        Ok(Self {
            name,
            size,
            view,
            is_creator: false,
        })
    }

    /// Get a slice view of the memory
    pub fn as_slice(&self) -> &[u8] {
        self.view.as_slice()
    }

    /// Get a mutable slice view of the memory
    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        self.view.as_mut_slice()
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        // The view unmaps itself; only the creator removes the name
        if self.is_creator {
            cleanup_platform_buffer(&self.name);
        }
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("is_creator", &self.is_creator)
            .finish()
    }
}

// Platform-specific implementations

#[cfg(unix)]
mod unix_impl {
    use crate::{ChannelError, Result};
    use memmap2::{MmapMut, MmapOptions};
    use nix::fcntl::OFlag;
    use nix::sys::stat::Mode;
    use std::ffi::CString;
    use std::fs::File;

    pub struct PlatformView {
        map: MmapMut,
    }

    impl PlatformView {
        pub fn as_slice(&self) -> &[u8] {
            &self.map[..]
        }

        pub fn as_mut_slice(&mut self) -> &mut [u8] {
            &mut self.map[..]
        }
    }

    fn shm_name(name: &str) -> Result<CString> {
        let name = if name.starts_with('/') {
            name.to_string()
        } else {
            format!("/{}", name)
        };
        CString::new(name).map_err(|_| ChannelError::InvalidName("name contains null byte".to_string()))
    }

    fn map(file: &File, size: usize) -> Result<PlatformView> {
        let map = unsafe { MmapOptions::new().len(size).map_mut(file) }
            .map_err(|e| ChannelError::MappingFailed(format!("mmap failed: {}", e)))?;
        Ok(PlatformView { map })
    }

    pub fn create_platform_buffer(name: &str, size: usize) -> Result<PlatformView> {
        let c_name = shm_name(name)?;

        let fd = nix::sys::mman::shm_open(
            c_name.as_c_str(),
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|e| ChannelError::from_errno(e as i32, format!("shm_open {} failed", name)))?;

        let file = File::from(fd);
        file.set_len(size as u64)?;
        map(&file, size)
    }

    pub fn open_platform_buffer(name: &str, size: usize) -> Result<PlatformView> {
        let c_name = shm_name(name)?;

        let fd = nix::sys::mman::shm_open(c_name.as_c_str(), OFlag::O_RDWR, Mode::empty())
            .map_err(|e| ChannelError::from_errno(e as i32, format!("shm_open {} failed", name)))?;

        let file = File::from(fd);
        let actual = file.metadata()?.len() as usize;
        if actual < size {
            return Err(ChannelError::BufferTooSmall { size: actual, min: size });
        }
        map(&file, size)
    }

    pub fn cleanup_platform_buffer(name: &str) {
        if let Ok(c_name) = shm_name(name) {
            let _ = nix::sys::mman::shm_unlink(c_name.as_c_str());
        }
    }
}

#[cfg(windows)]
mod windows_impl {
    use crate::{ChannelError, Result};
    use std::ffi::CString;
    use std::ptr::NonNull;
    use winapi::shared::minwindef::FALSE;
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::memoryapi::{MapViewOfFile, UnmapViewOfFile, FILE_MAP_ALL_ACCESS};
    use winapi::um::winbase::{CreateFileMappingA, OpenFileMappingA};
    use winapi::um::winnt::{HANDLE, PAGE_READWRITE};

    pub struct PlatformView {
        handle: HANDLE,
        ptr: NonNull<u8>,
        size: usize,
    }

    // Safety: the view is owned exclusively and only touched through &mut
    unsafe impl Send for PlatformView {}

    impl PlatformView {
        pub fn as_slice(&self) -> &[u8] {
            unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
        }

        pub fn as_mut_slice(&mut self) -> &mut [u8] {
            unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
        }
    }

    impl Drop for PlatformView {
        fn drop(&mut self) {
            unsafe {
                UnmapViewOfFile(self.ptr.as_ptr() as *const _);
                CloseHandle(self.handle);
            }
        }
    }

    fn map(handle: HANDLE, size: usize) -> Result<PlatformView> {
        let ptr = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, size) };

        match NonNull::new(ptr as *mut u8) {
            Some(ptr) => Ok(PlatformView { handle, ptr, size }),
            None => {
                unsafe { CloseHandle(handle) };
                Err(ChannelError::MappingFailed("MapViewOfFile failed".to_string()))
            }
        }
    }

    pub fn create_platform_buffer(name: &str, size: usize) -> Result<PlatformView> {
        let c_name = CString::new(name)
            .map_err(|_| ChannelError::InvalidName("name contains null byte".to_string()))?;

        let handle = unsafe {
            CreateFileMappingA(
                INVALID_HANDLE_VALUE,
                std::ptr::null_mut(),
                PAGE_READWRITE,
                (size as u64 >> 32) as u32,
                (size as u64 & 0xFFFF_FFFF) as u32,
                c_name.as_ptr(),
            )
        };

        if handle.is_null() {
            return Err(ChannelError::Platform("CreateFileMapping failed".to_string()));
        }

        map(handle, size)
    }

    pub fn open_platform_buffer(name: &str, size: usize) -> Result<PlatformView> {
        let c_name = CString::new(name)
            .map_err(|_| ChannelError::InvalidName("name contains null byte".to_string()))?;

        let handle = unsafe { OpenFileMappingA(FILE_MAP_ALL_ACCESS, FALSE, c_name.as_ptr()) };

        if handle.is_null() {
            return Err(ChannelError::ResourceNotFound(name.to_string()));
        }

        // Mapping more than the section holds fails, which covers the size check
        map(handle, size)
    }

    pub fn cleanup_platform_buffer(_name: &str) {}
}

#[cfg(not(any(unix, windows)))]
mod fallback_impl {
    use crate::{ChannelError, Result};

    pub struct PlatformView(std::convert::Infallible);

    impl PlatformView {
        pub fn as_slice(&self) -> &[u8] {
            match self.0 {}
        }

        pub fn as_mut_slice(&mut self) -> &mut [u8] {
            match self.0 {}
        }
    }

    pub fn create_platform_buffer(_name: &str, _size: usize) -> Result<PlatformView> {
        Err(ChannelError::Unsupported)
    }

    pub fn open_platform_buffer(_name: &str, _size: usize) -> Result<PlatformView> {
        Err(ChannelError::Unsupported)
    }

    pub fn cleanup_platform_buffer(_name: &str) {}
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use unix_impl::*;
    } else if #[cfg(windows)] {
        use windows_impl::*;
    } else {
        use fallback_impl::*;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{ChannelError, PlatformUtils};

    #[test]
    fn test_create_and_open() {
        let name = PlatformUtils::generate_resource_prefix("region_test");

        let mut created = SharedBuffer::create(&name, 4096).unwrap();
        assert_eq!(created.size, 4096);
        created.as_slice_mut()[..3].copy_from_slice(b"abc");

        let opened = SharedBuffer::open(&name, 4096).unwrap();
        assert_eq!(&opened.as_slice()[..3], b"abc");
        assert_eq!(opened.as_slice().len(), 4096);
    }

    #[test]
    fn test_open_missing() {
        let name = PlatformUtils::generate_resource_prefix("region_missing");
        let result = SharedBuffer::open(&name, 4096);
        assert!(matches!(result, Err(ChannelError::ResourceNotFound(_))));
    }

    #[test]
    fn test_open_undersized() {
        let name = PlatformUtils::generate_resource_prefix("region_small");
        let _created = SharedBuffer::create(&name, 1024).unwrap();

        let result = SharedBuffer::open(&name, 4096);
        assert!(matches!(
            result,
            Err(ChannelError::BufferTooSmall { size: 1024, min: 4096 })
        ));
    }

    #[test]
    fn test_creator_removes_name() {
        let name = PlatformUtils::generate_resource_prefix("region_unlink");
        drop(SharedBuffer::create(&name, 4096).unwrap());
        assert!(SharedBuffer::open(&name, 4096).is_err());
    }

    #[test]
    fn test_invalid_name() {
        assert!(matches!(
            SharedBuffer::create("", 4096),
            Err(ChannelError::InvalidName(_))
        ));
    }
}

//! Platform queries for the notification channel

/// Platform-specific utilities
pub struct PlatformUtils;

impl PlatformUtils {
    /// Get current process ID
    pub fn get_process_id() -> u32 {
        #[cfg(unix)]
        {
            unsafe { libc::getpid() as u32 }
        }
        #[cfg(not(unix))]
        {
            std::process::id()
        }
    }

    /// Whether this target has both shared memory and named signals
    pub fn is_supported() -> bool {
        cfg!(any(target_os = "linux", windows))
    }

    /// Generate a resource prefix no other channel is using
    pub fn generate_resource_prefix(prefix: &str) -> String {
        format!(
            "{}_{}_{}",
            prefix,
            Self::get_process_id(),
            uuid::Uuid::new_v4().simple()
        )
    }
}

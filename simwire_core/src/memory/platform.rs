// Platform shared memory path abstraction
//
// Linux: /dev/shm/simwire (tmpfs - RAM-backed, fastest)
// Other Unix: /tmp/simwire (regular filesystem, but still fast for IPC)

use std::path::PathBuf;

/// Get the base directory for SimWire shared memory
///
/// This returns a platform-appropriate path for shared memory:
/// - Linux: `/dev/shm/simwire` (tmpfs for maximum performance)
/// - Other Unix: `/tmp/simwire` (no /dev/shm, but /tmp is still fast)
pub fn shm_base_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/dev/shm/simwire")
    }

    #[cfg(not(target_os = "linux"))]
    {
        PathBuf::from("/tmp/simwire")
    }
}

/// Get the default backing-file path for a named region
pub fn shm_region_path(name: &str) -> PathBuf {
    let safe_name = name.replace(['/', ':'], "_");
    shm_base_dir().join(safe_name)
}

/// Check if we're running on a platform with true shared memory (tmpfs)
pub fn has_native_shm() -> bool {
    cfg!(target_os = "linux")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shm_paths_are_valid() {
        let base = shm_base_dir();
        assert!(!base.as_os_str().is_empty());

        let region = shm_region_path("nic0");
        assert!(region.starts_with(&base));
    }

    #[test]
    fn test_region_names_are_sanitized() {
        let region = shm_region_path("sim/dev:0");
        assert!(!region.file_name().unwrap().to_string_lossy().contains('/'));
        assert!(!region.to_string_lossy().contains(':'));
    }

    #[test]
    fn test_native_shm_matches_base_dir() {
        if has_native_shm() {
            assert!(shm_base_dir().starts_with("/dev/shm"));
        } else {
            assert!(shm_base_dir().starts_with("/tmp"));
        }
    }
}

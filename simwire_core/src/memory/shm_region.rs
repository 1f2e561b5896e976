// Shared memory region backing the transport queues
use crate::error::{Result, SimWireError};
use crate::memory::platform;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Memory-mapped region shared between the device process and its peers.
///
/// The device side creates the region with [`ShmRegion::create`] and hands
/// the backing file descriptor to each peer over the rendezvous socket.
/// Peers map it with [`ShmRegion::from_fd`] and never see the filesystem
/// name, so a region is only ever reachable through the handshake.
#[derive(Debug)]
pub struct ShmRegion {
    #[allow(dead_code)]
    mmap: MmapMut,
    base: NonNull<u8>,
    size: usize,
    path: Option<PathBuf>,
    file: File,
    owner: bool,
}

impl ShmRegion {
    /// Create a zero-filled region of `size` bytes backed by `path`.
    pub fn create(path: &Path, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(SimWireError::memory("region size must be nonzero"));
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size as u64)?;

        let mut mmap = unsafe { MmapOptions::new().len(size).map_mut(&file)? };

        // A zeroed slot is producer-owned; peers depend on that initial state.
        mmap.fill(0);

        if !platform::has_native_shm() {
            log::debug!("no tmpfs on this platform; region {} is file-backed", path.display());
        }
        log::debug!("created shm region {} ({} bytes)", path.display(), size);

        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| SimWireError::memory("mapping returned a null base pointer"))?;

        Ok(Self {
            mmap,
            base,
            size,
            path: Some(path.to_path_buf()),
            file,
            owner: true,
        })
    }

    /// Map a region from a descriptor received over the rendezvous socket.
    pub fn from_fd(fd: OwnedFd) -> Result<Self> {
        let file = File::from(fd);
        let size = file.metadata()?.len() as usize;
        if size == 0 {
            return Err(SimWireError::memory("received region handle is empty"));
        }

        let mut mmap = unsafe { MmapOptions::new().len(size).map_mut(&file)? };

        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| SimWireError::memory("mapping returned a null base pointer"))?;

        Ok(Self {
            mmap,
            base,
            size,
            path: None,
            file,
            owner: false,
        })
    }

    /// Base pointer of the mapping. Queue construction derives slot
    /// addresses from this; all other access goes through the queues.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Descriptor of the backing file, for SCM_RIGHTS transfer to a peer.
    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        if self.owner {
            if let Some(path) = &self.path {
                if let Err(err) = std::fs::remove_file(path) {
                    log::warn!("failed to remove shm region {}: {}", path.display(), err);
                }
            }
        }
    }
}

// Both processes keep the same bytes mapped; which side may touch a given
// slot at any moment is decided by that slot's ownership bit, never by
// Rust references into the mapping.
unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

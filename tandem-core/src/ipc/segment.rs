//! Shared-memory segment plumbing
//!
//! Every IPC object in this runtime (the three ring queues, the
//! client-id store, the t-var cell) lives in its own fixed-size
//! file-backed mapping. Queues are published under `/dev/shm` and named
//! by their 4-byte integer key so unrelated processes can attach by key
//! alone; tests map ordinary temp files through the same code path.

use crate::core::EngineError;
use memmap2::MmapRaw;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Conventional mount point for named segments.
const SHM_DIR: &str = "/dev/shm";

/// Path of the queue segment for a numeric key, e.g. key 9001 →
/// `/dev/shm/tdm_q9001`.
pub fn queue_path(key: u32) -> PathBuf {
    PathBuf::from(SHM_DIR).join(format!("tdm_q{key}"))
}

/// Path of a scalar cell segment for a numeric key, e.g. key 77 →
/// `/dev/shm/tdm_c77`.
pub fn cell_path(key: u32) -> PathBuf {
    PathBuf::from(SHM_DIR).join(format!("tdm_c{key}"))
}

/// A fixed-size shared mapping
///
/// The mapping is shared (`MAP_SHARED`) so external producers and
/// consumers observe each other's stores; all cross-process coordination
/// goes through atomics placed inside the mapping.
#[derive(Debug)]
pub struct ShmSegment {
    map: MmapRaw,
    len: usize,
    path: PathBuf,
    created: bool,
}

impl ShmSegment {
    /// Create a segment of exactly `len` bytes, zero-filled.
    ///
    /// Truncates any pre-existing file at `path`: creation is the
    /// producer-side reset of the segment.
    pub fn create(path: &Path, len: usize) -> Result<Self, EngineError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| EngineError::IpcFatal {
                detail: format!("create {}: {e}", path.display()),
            })?;
        file.set_len(len as u64).map_err(|e| EngineError::IpcFatal {
            detail: format!("resize {}: {e}", path.display()),
        })?;

        let map = MmapRaw::map_raw(&file).map_err(|e| EngineError::IpcFatal {
            detail: format!("mmap {}: {e}", path.display()),
        })?;

        let seg = Self {
            map,
            len,
            path: path.to_path_buf(),
            created: true,
        };
        seg.lock_resident();
        Ok(seg)
    }

    /// Attach to an existing segment. The file length is the segment
    /// length; a missing file is a fatal attach error.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| EngineError::IpcFatal {
                detail: format!("attach {}: {e}", path.display()),
            })?;
        let len = file
            .metadata()
            .map_err(|e| EngineError::IpcFatal {
                detail: format!("stat {}: {e}", path.display()),
            })?
            .len() as usize;
        if len == 0 {
            return Err(EngineError::IpcFatal {
                detail: format!("attach {}: empty segment", path.display()),
            });
        }

        let map = MmapRaw::map_raw(&file).map_err(|e| EngineError::IpcFatal {
            detail: format!("mmap {}: {e}", path.display()),
        })?;

        let seg = Self {
            map,
            len,
            path: path.to_path_buf(),
            created: false,
        };
        seg.lock_resident();
        Ok(seg)
    }

    /// Attach if the segment exists, otherwise create it.
    pub fn open_or_create(path: &Path, len: usize) -> Result<Self, EngineError> {
        if path.exists() {
            let seg = Self::open(path)?;
            if seg.len != len {
                return Err(EngineError::IpcFatal {
                    detail: format!(
                        "attach {}: length {} != expected {}",
                        path.display(),
                        seg.len,
                        len
                    ),
                });
            }
            Ok(seg)
        } else {
            Self::create(path, len)
        }
    }

    /// Pin the mapping into RAM. Best-effort: failure (ulimit, perms)
    /// only costs page faults, so it is logged and ignored.
    fn lock_resident(&self) {
        let rc = unsafe { libc::mlock(self.map.as_ptr() as *const libc::c_void, self.len) };
        if rc != 0 {
            tracing::debug!(
                "mlock failed for {} ({} bytes), continuing unpinned",
                self.path.display(),
                self.len
            );
        }
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.map.as_mut_ptr()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether this handle created (and zero-initialised) the segment.
    #[inline(always)]
    pub fn created(&self) -> bool {
        self.created
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// The mapping is shared memory coordinated by atomics embedded in it.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg");

        let seg = ShmSegment::create(&path, 4096).unwrap();
        assert_eq!(seg.len(), 4096);
        assert!(seg.created());

        // Creation zero-fills.
        let first = unsafe { *seg.as_ptr() };
        assert_eq!(first, 0);

        // Write through one handle, observe through another.
        unsafe { *seg.as_ptr() = 0xAB };
        let other = ShmSegment::open(&path).unwrap();
        assert!(!other.created());
        assert_eq!(unsafe { *other.as_ptr() }, 0xAB);
    }

    #[test]
    fn test_open_missing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShmSegment::open(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::IpcFatal);
    }

    #[test]
    fn test_open_or_create_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg");
        ShmSegment::create(&path, 1024).unwrap();

        let err = ShmSegment::open_or_create(&path, 2048).unwrap_err();
        assert!(format!("{err}").contains("length"));
    }

    #[test]
    fn test_queue_and_cell_paths() {
        assert_eq!(queue_path(9001), PathBuf::from("/dev/shm/tdm_q9001"));
        assert_eq!(cell_path(77), PathBuf::from("/dev/shm/tdm_c77"));
    }
}

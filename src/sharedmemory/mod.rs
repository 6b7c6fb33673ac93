//! A named shared-memory region with cross-process synchronization.
//!
//! Two interchangeable backends implement the same contract: a POSIX one
//! (`shm_open` with a process-shared pthread mutex and condition variable
//! living inside the mapping) and a SysV one (`shmget` with a semaphore pair
//! keyed off a token file under `/tmp`). The backend is selected per
//! construction by the `CLUON_SHAREDMEMORY_POSIX` environment variable:
//! `"1"` selects POSIX, anything else SysV.
//!
//! Construction never fails fatally: on any create/attach failure the object
//! degrades to an invalid state (`valid()` is `false`, no data, size 0) after
//! logging a warning. Users are contractually required to hold the lock
//! while reading or writing the payload.

mod posix;
mod sysv;

use posix::PosixSharedMemory;
use sysv::SysvSharedMemory;

/// Environment variable selecting the POSIX backend when set to `"1"`.
pub const BACKEND_ENV: &str = "CLUON_SHAREDMEMORY_POSIX";

/// Maximum length of a normalized region name, including any prefix.
const MAX_NAME_LEN: usize = 254;

#[derive(Debug)]
enum Backend {
    Posix(PosixSharedMemory),
    Sysv(SysvSharedMemory),
}

/// A named, fixed-size shared-memory region.
///
/// The creator (constructed with a non-zero size) owns the named object and
/// removes it on drop; attachers (size 0) only detach. `lock`/`unlock` guard
/// the payload across processes, `wait`/`notify_all` provide a co-located
/// condition variable. None of the operations panic; on an invalid instance
/// they are no-ops.
#[derive(Debug)]
pub struct SharedMemory {
    inner: Backend,
}

impl SharedMemory {
    /// Creates (`size > 0`) or attaches to (`size == 0`) the named region.
    pub fn new(name: &str, size: usize) -> SharedMemory {
        let use_posix = std::env::var(BACKEND_ENV)
            .map(|value| value.starts_with('1'))
            .unwrap_or(false);

        let inner = if use_posix {
            Backend::Posix(PosixSharedMemory::new(normalize_posix_name(name), size))
        } else {
            Backend::Sysv(SysvSharedMemory::new(normalize_sysv_name(name), size))
        };
        SharedMemory { inner }
    }

    /// Creates a fresh region of `size` bytes.
    pub fn create(name: &str, size: usize) -> SharedMemory {
        SharedMemory::new(name, size)
    }

    /// Attaches to an existing region.
    pub fn attach(name: &str) -> SharedMemory {
        SharedMemory::new(name, 0)
    }

    /// Whether the region is usable. A failed construction or a displaced
    /// SysV instance reports `false`.
    pub fn valid(&self) -> bool {
        match &self.inner {
            Backend::Posix(inner) => inner.valid(),
            Backend::Sysv(inner) => inner.valid(),
        }
    }

    /// The normalized region name.
    pub fn name(&self) -> &str {
        match &self.inner {
            Backend::Posix(inner) => inner.name(),
            Backend::Sysv(inner) => inner.name(),
        }
    }

    /// The user payload size in bytes; 0 for an invalid region.
    pub fn size(&self) -> usize {
        match &self.inner {
            Backend::Posix(inner) => inner.size(),
            Backend::Sysv(inner) => inner.size(),
        }
    }

    /// Raw pointer to the user payload; null for an invalid region.
    pub fn data(&self) -> *mut u8 {
        match &self.inner {
            Backend::Posix(inner) => inner.data(),
            Backend::Sysv(inner) => inner.data(),
        }
    }

    /// The user payload as a mutable slice, or `None` for an invalid region.
    ///
    /// The memory is shared with other processes; callers must hold the lock
    /// while touching it.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        let (data, size) = (self.data(), self.size());
        if data.is_null() || size == 0 {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts_mut(data, size) })
    }

    /// Acquires the cross-process mutex. Not re-entrant.
    pub fn lock(&mut self) {
        match &mut self.inner {
            Backend::Posix(inner) => inner.lock(),
            Backend::Sysv(inner) => inner.lock(),
        }
    }

    /// Releases the cross-process mutex.
    pub fn unlock(&mut self) {
        match &mut self.inner {
            Backend::Posix(inner) => inner.unlock(),
            Backend::Sysv(inner) => inner.unlock(),
        }
    }

    /// Blocks on the region's condition variable until [`notify_all`] is
    /// called (or a spurious wakeup occurs). The lock is released while
    /// waiting and re-acquired before returning.
    ///
    /// [`notify_all`]: SharedMemory::notify_all
    pub fn wait(&mut self) {
        match &mut self.inner {
            Backend::Posix(inner) => inner.wait(),
            Backend::Sysv(inner) => inner.wait(),
        }
    }

    /// Wakes every process currently blocked in [`wait`].
    ///
    /// [`wait`]: SharedMemory::wait
    pub fn notify_all(&mut self) {
        match &mut self.inner {
            Backend::Posix(inner) => inner.notify_all(),
            Backend::Sysv(inner) => inner.notify_all(),
        }
    }
}

/// POSIX names carry exactly one leading `/` and are capped at 254
/// characters. The empty name stays empty (and yields an invalid region).
fn normalize_posix_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let mut normalized = String::with_capacity(name.len() + 1);
    normalized.push('/');
    normalized.push_str(name.strip_prefix('/').unwrap_or(name));
    normalized.truncate(MAX_NAME_LEN);
    normalized
}

/// SysV names are filesystem paths under `/tmp`, capped at 254 characters.
fn normalize_sysv_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    if let Some(rest) = name.strip_prefix("/tmp/") {
        let mut normalized = format!("/tmp/{}", rest);
        normalized.truncate(MAX_NAME_LEN);
        return normalized;
    }
    let mut normalized = format!("/tmp/{}", name.strip_prefix('/').unwrap_or(name));
    normalized.truncate(MAX_NAME_LEN);
    normalized
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn posix_name_normalization() {
        assert_eq!(normalize_posix_name(""), "");
        assert_eq!(normalize_posix_name("ABC"), "/ABC");
        assert_eq!(normalize_posix_name("/ABC"), "/ABC");

        let long = "X".repeat(300);
        let normalized = normalize_posix_name(&long);
        assert_eq!(normalized.len(), 254);
        assert!(normalized.starts_with('/'));
    }

    #[test]
    fn sysv_name_normalization() {
        assert_eq!(normalize_sysv_name("ABC"), "/tmp/ABC");
        assert_eq!(normalize_sysv_name("/DEF"), "/tmp/DEF");
        assert_eq!(normalize_sysv_name("/tmp/DEF"), "/tmp/DEF");
        assert_eq!(
            normalize_sysv_name("/tmp/nested/folders/not/supported"),
            "/tmp/nested/folders/not/supported"
        );

        let long = "X".repeat(300);
        let normalized = normalize_sysv_name(&long);
        assert_eq!(normalized.len(), 254);
        assert!(normalized.starts_with("/tmp/"));
    }
}

//! POSIX shared-memory backend.
//!
//! The mapping starts with a hidden control header holding a process-shared
//! `pthread_mutex_t` and `pthread_cond_t`, initialized once by the creator;
//! the user payload follows the header. Attachers map the same object and
//! find the synchronization primitives at the known offset.

use std::ffi::CString;
use std::mem;
use std::ptr;

use log::warn;

/// Control block at the start of every mapping.
#[repr(C)]
struct Header {
    mutex: libc::pthread_mutex_t,
    condition: libc::pthread_cond_t,
}

#[derive(Debug)]
pub(super) struct PosixSharedMemory {
    name: String,
    created: bool,
    fd: libc::c_int,
    mapping: *mut libc::c_void,
    /// User payload size, excluding the control header.
    size: usize,
}

// The raw mapping pointer is only dereferenced through &mut self.
unsafe impl Send for PosixSharedMemory {}

impl PosixSharedMemory {
    pub(super) fn new(name: String, size: usize) -> PosixSharedMemory {
        let mut region = PosixSharedMemory {
            name,
            created: size > 0,
            fd: -1,
            mapping: ptr::null_mut(),
            size: 0,
        };
        if region.name.is_empty() {
            return region;
        }

        let c_name = match CString::new(region.name.as_str()) {
            Ok(c_name) => c_name,
            Err(_) => return region,
        };

        if region.created {
            region.open_fresh(&c_name, size);
        } else {
            region.open_existing(&c_name);
        }
        region
    }

    /// Creates a new named object; an existing object with the same name is
    /// unlinked first so the creator always starts from a fresh region.
    /// Earlier attachments keep their own mapping of the old object.
    fn open_fresh(&mut self, c_name: &CString, size: usize) {
        let mode: libc::mode_t = 0o600;
        let oflag = libc::O_CREAT | libc::O_EXCL | libc::O_RDWR;

        let mut fd = unsafe { libc::shm_open(c_name.as_ptr(), oflag, mode) };
        if fd < 0 && last_errno() == libc::EEXIST {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            fd = unsafe { libc::shm_open(c_name.as_ptr(), oflag, mode) };
        }
        if fd < 0 {
            warn!("could not create shared memory '{}'", self.name);
            return;
        }

        let total = mem::size_of::<Header>() + size;
        if unsafe { libc::ftruncate(fd, total as libc::off_t) } != 0 {
            warn!("could not size shared memory '{}'", self.name);
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return;
        }

        let mapping = map(fd, total);
        if mapping.is_null() {
            warn!("could not map shared memory '{}'", self.name);
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return;
        }

        // The creator initializes the process-shared primitives exactly once.
        unsafe {
            let header = mapping.cast::<Header>();

            let mut mutex_attr: libc::pthread_mutexattr_t = mem::zeroed();
            libc::pthread_mutexattr_init(&mut mutex_attr);
            libc::pthread_mutexattr_setpshared(&mut mutex_attr, libc::PTHREAD_PROCESS_SHARED);
            libc::pthread_mutex_init(&mut (*header).mutex, &mutex_attr);
            libc::pthread_mutexattr_destroy(&mut mutex_attr);

            let mut cond_attr: libc::pthread_condattr_t = mem::zeroed();
            libc::pthread_condattr_init(&mut cond_attr);
            libc::pthread_condattr_setpshared(&mut cond_attr, libc::PTHREAD_PROCESS_SHARED);
            libc::pthread_cond_init(&mut (*header).condition, &cond_attr);
            libc::pthread_condattr_destroy(&mut cond_attr);
        }

        self.fd = fd;
        self.mapping = mapping;
        self.size = size;
    }

    fn open_existing(&mut self, c_name: &CString) {
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            warn!("could not attach to shared memory '{}'", self.name);
            return;
        }

        let mut stat: libc::stat = unsafe { mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut stat) } != 0
            || (stat.st_size as usize) < mem::size_of::<Header>()
        {
            warn!("could not inspect shared memory '{}'", self.name);
            unsafe { libc::close(fd) };
            return;
        }
        let total = stat.st_size as usize;

        let mapping = map(fd, total);
        if mapping.is_null() {
            warn!("could not map shared memory '{}'", self.name);
            unsafe { libc::close(fd) };
            return;
        }

        self.fd = fd;
        self.mapping = mapping;
        self.size = total - mem::size_of::<Header>();
    }

    fn header(&self) -> Option<*mut Header> {
        if self.mapping.is_null() {
            None
        } else {
            Some(self.mapping.cast::<Header>())
        }
    }

    pub(super) fn valid(&self) -> bool {
        !self.mapping.is_null()
    }

    pub(super) fn name(&self) -> &str {
        &self.name
    }

    pub(super) fn size(&self) -> usize {
        self.size
    }

    pub(super) fn data(&self) -> *mut u8 {
        if self.mapping.is_null() {
            ptr::null_mut()
        } else {
            unsafe { self.mapping.cast::<u8>().add(mem::size_of::<Header>()) }
        }
    }

    pub(super) fn lock(&mut self) {
        if let Some(header) = self.header() {
            unsafe { libc::pthread_mutex_lock(&mut (*header).mutex) };
        }
    }

    pub(super) fn unlock(&mut self) {
        if let Some(header) = self.header() {
            unsafe { libc::pthread_mutex_unlock(&mut (*header).mutex) };
        }
    }

    pub(super) fn wait(&mut self) {
        if let Some(header) = self.header() {
            unsafe { libc::pthread_cond_wait(&mut (*header).condition, &mut (*header).mutex) };
        }
    }

    pub(super) fn notify_all(&mut self) {
        if let Some(header) = self.header() {
            unsafe { libc::pthread_cond_broadcast(&mut (*header).condition) };
        }
    }
}

impl Drop for PosixSharedMemory {
    fn drop(&mut self) {
        let owned = self.created && !self.mapping.is_null();
        if !self.mapping.is_null() {
            let total = mem::size_of::<Header>() + self.size;
            unsafe { libc::munmap(self.mapping, total) };
        }
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
        }
        // Only a successful creator unlinks the name.
        if owned {
            if let Ok(c_name) = CString::new(self.name.as_str()) {
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
            }
        }
    }
}

fn map(fd: libc::c_int, total: usize) -> *mut libc::c_void {
    let mapping = unsafe {
        libc::mmap(
            ptr::null_mut(),
            total,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if mapping == libc::MAP_FAILED {
        ptr::null_mut()
    } else {
        mapping
    }
}

fn last_errno() -> libc::c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

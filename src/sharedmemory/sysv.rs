//! SysV shared-memory backend.
//!
//! A token file at the region's path feeds `ftok`; the segment comes from
//! `shmget` and the cross-process mutex and condition variable are realized
//! as a two-entry semaphore set on the same key. A second creator for an
//! already-owned name removes and recreates the kernel objects, which
//! displaces the first instance: its next `lock` fails, marks it broken, and
//! every further operation becomes a no-op.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::mem;
use std::ptr;

use log::warn;

/// Project id fed to `ftok`.
const FTOK_ID: libc::c_int = b'c' as libc::c_int;

/// Semaphore indices within the set.
const SEM_MUTEX: libc::c_ushort = 0;
const SEM_CONDITION: libc::c_ushort = 1;

/// Argument union for `semctl`, as defined by the SysV API.
#[repr(C)]
#[derive(Clone, Copy)]
union Semun {
    val: libc::c_int,
    buf: *mut libc::semid_ds,
    array: *mut libc::c_ushort,
}

#[derive(Debug)]
pub(super) struct SysvSharedMemory {
    name: String,
    created: bool,
    shm_id: libc::c_int,
    sem_id: libc::c_int,
    attachment: *mut libc::c_void,
    size: usize,
    /// Set when the kernel objects disappeared underneath this instance.
    broken: bool,
}

// The raw attachment pointer is only dereferenced through &mut self.
unsafe impl Send for SysvSharedMemory {}

impl SysvSharedMemory {
    pub(super) fn new(name: String, size: usize) -> SysvSharedMemory {
        let mut region = SysvSharedMemory {
            name,
            created: size > 0,
            shm_id: -1,
            sem_id: -1,
            attachment: ptr::null_mut(),
            size: 0,
            broken: false,
        };
        if region.name.is_empty() {
            return region;
        }

        if region.created {
            region.open_fresh(size);
        } else {
            region.open_existing();
        }
        region
    }

    fn key(&self) -> Option<libc::key_t> {
        let c_name = CString::new(self.name.as_str()).ok()?;
        let key = unsafe { libc::ftok(c_name.as_ptr(), FTOK_ID) };
        if key == -1 {
            None
        } else {
            Some(key)
        }
    }

    fn open_fresh(&mut self, size: usize) {
        // The path doubles as the IPC key; nested directories are not
        // created on behalf of the caller, so such names fail here.
        if OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.name)
            .is_err()
        {
            warn!("could not create token file '{}'", self.name);
            return;
        }

        let key = match self.key() {
            Some(key) => key,
            None => {
                warn!("could not derive IPC key for '{}'", self.name);
                return;
            }
        };

        let flags = libc::IPC_CREAT | libc::IPC_EXCL | 0o600;
        let mut shm_id = unsafe { libc::shmget(key, size, flags) };
        if shm_id == -1 {
            // Displace the previous owner.
            let existing = unsafe { libc::shmget(key, 0, 0) };
            if existing != -1 {
                unsafe { libc::shmctl(existing, libc::IPC_RMID, ptr::null_mut()) };
            }
            shm_id = unsafe { libc::shmget(key, size, flags) };
        }
        if shm_id == -1 {
            warn!("could not create shared memory segment '{}'", self.name);
            return;
        }

        let mut sem_id = unsafe { libc::semget(key, 2, flags) };
        if sem_id == -1 {
            let existing = unsafe { libc::semget(key, 0, 0) };
            if existing != -1 {
                unsafe { libc::semctl(existing, 0, libc::IPC_RMID) };
            }
            sem_id = unsafe { libc::semget(key, 2, flags) };
        }
        if sem_id == -1 {
            warn!("could not create semaphores for '{}'", self.name);
            unsafe { libc::shmctl(shm_id, libc::IPC_RMID, ptr::null_mut()) };
            return;
        }

        // Mutex unlocked, condition armed for wait-for-zero.
        unsafe {
            libc::semctl(sem_id, SEM_MUTEX as libc::c_int, libc::SETVAL, Semun { val: 1 });
            libc::semctl(
                sem_id,
                SEM_CONDITION as libc::c_int,
                libc::SETVAL,
                Semun { val: 1 },
            );
        }

        let attachment = unsafe { libc::shmat(shm_id, ptr::null(), 0) };
        if attachment as isize == -1 {
            warn!("could not attach shared memory segment '{}'", self.name);
            unsafe {
                libc::shmctl(shm_id, libc::IPC_RMID, ptr::null_mut());
                libc::semctl(sem_id, 0, libc::IPC_RMID);
            }
            return;
        }

        self.shm_id = shm_id;
        self.sem_id = sem_id;
        self.attachment = attachment;
        self.size = size;
    }

    fn open_existing(&mut self) {
        let key = match self.key() {
            Some(key) => key,
            None => {
                warn!("could not derive IPC key for '{}'", self.name);
                return;
            }
        };

        let shm_id = unsafe { libc::shmget(key, 0, 0) };
        if shm_id == -1 {
            warn!("could not find shared memory segment '{}'", self.name);
            return;
        }

        let mut stat: libc::shmid_ds = unsafe { mem::zeroed() };
        if unsafe { libc::shmctl(shm_id, libc::IPC_STAT, &mut stat) } == -1 {
            warn!("could not inspect shared memory segment '{}'", self.name);
            return;
        }

        let sem_id = unsafe { libc::semget(key, 2, 0) };
        if sem_id == -1 {
            warn!("could not find semaphores for '{}'", self.name);
            return;
        }

        let attachment = unsafe { libc::shmat(shm_id, ptr::null(), 0) };
        if attachment as isize == -1 {
            warn!("could not attach shared memory segment '{}'", self.name);
            return;
        }

        self.shm_id = shm_id;
        self.sem_id = sem_id;
        self.attachment = attachment;
        self.size = stat.shm_segsz as usize;
    }

    /// Runs one semaphore operation; any failure marks the instance broken.
    fn semop(&mut self, sem_num: libc::c_ushort, sem_op: libc::c_short, sem_flg: libc::c_short) {
        if self.broken || self.sem_id == -1 {
            return;
        }
        let mut op = libc::sembuf {
            sem_num,
            sem_op,
            sem_flg,
        };
        if unsafe { libc::semop(self.sem_id, &mut op, 1) } == -1 {
            self.broken = true;
        }
    }

    pub(super) fn valid(&self) -> bool {
        !self.broken && !self.attachment.is_null()
    }

    pub(super) fn name(&self) -> &str {
        &self.name
    }

    pub(super) fn size(&self) -> usize {
        if self.valid() {
            self.size
        } else {
            0
        }
    }

    pub(super) fn data(&self) -> *mut u8 {
        if self.valid() {
            self.attachment.cast::<u8>()
        } else {
            ptr::null_mut()
        }
    }

    pub(super) fn lock(&mut self) {
        self.semop(SEM_MUTEX, -1, libc::SEM_UNDO as libc::c_short);
    }

    pub(super) fn unlock(&mut self) {
        self.semop(SEM_MUTEX, 1, libc::SEM_UNDO as libc::c_short);
    }

    pub(super) fn wait(&mut self) {
        if !self.valid() {
            return;
        }
        // Condvar contract: drop the lock, block, take the lock back.
        self.unlock();
        self.semop(SEM_CONDITION, 0, 0);
        self.lock();
    }

    pub(super) fn notify_all(&mut self) {
        if !self.valid() || self.sem_id == -1 {
            return;
        }
        // Dropping the value to zero releases every wait-for-zero sleeper;
        // raising it again re-arms the condition.
        unsafe {
            if libc::semctl(
                self.sem_id,
                SEM_CONDITION as libc::c_int,
                libc::SETVAL,
                Semun { val: 0 },
            ) == -1
            {
                self.broken = true;
                return;
            }
            libc::semctl(
                self.sem_id,
                SEM_CONDITION as libc::c_int,
                libc::SETVAL,
                Semun { val: 1 },
            );
        }
    }
}

impl Drop for SysvSharedMemory {
    fn drop(&mut self) {
        if !self.attachment.is_null() {
            unsafe { libc::shmdt(self.attachment) };
        }
        if self.created {
            if self.shm_id != -1 {
                unsafe { libc::shmctl(self.shm_id, libc::IPC_RMID, ptr::null_mut()) };
            }
            if self.sem_id != -1 {
                unsafe { libc::semctl(self.sem_id, 0, libc::IPC_RMID) };
            }
            if !self.name.is_empty() {
                let _ = std::fs::remove_file(&self.name);
            }
        }
    }
}

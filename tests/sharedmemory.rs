//! Shared-memory scenarios exercising both backends.
//!
//! The backend is chosen per construction from `CLUON_SHAREDMEMORY_POSIX`,
//! so every test grabs a process-wide lock before touching the environment.

#![cfg(unix)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::Duration;

use cluon::SharedMemory;

fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn with_backend<T>(posix: bool, test: impl FnOnce() -> T) -> T {
    let _guard = env_lock();
    std::env::set_var("CLUON_SHAREDMEMORY_POSIX", if posix { "1" } else { "0" });
    let result = test();
    std::env::remove_var("CLUON_SHAREDMEMORY_POSIX");
    result
}

/// A test-unique region name, avoiding collisions between runs.
fn unique_name(label: &str) -> String {
    format!("cluon-test-{}-{}", std::process::id(), label)
}

fn read_u32(region: &mut SharedMemory) -> u32 {
    let slice = region.as_mut_slice().expect("region is invalid");
    u32::from_ne_bytes(slice[..4].try_into().unwrap())
}

fn write_u32(region: &mut SharedMemory, value: u32) {
    let slice = region.as_mut_slice().expect("region is invalid");
    slice[..4].copy_from_slice(&value.to_ne_bytes());
}

#[test]
fn posix_empty_name_is_invalid() {
    with_backend(true, || {
        let region = SharedMemory::new("", 0);
        assert!(!region.valid());
        assert_eq!(region.size(), 0);
        assert!(region.data().is_null());
        assert!(region.name().is_empty());
    });
}

#[test]
fn posix_attaching_to_missing_name_is_invalid() {
    with_backend(true, || {
        let region = SharedMemory::attach("ABC");
        assert!(!region.valid());
        assert_eq!(region.size(), 0);
        assert!(region.data().is_null());
        assert_eq!(region.name(), "/ABC");
    });
}

#[test]
fn posix_long_names_are_truncated() {
    with_backend(true, || {
        let long = "Y".repeat(300);
        let region = SharedMemory::attach(&long);
        assert!(!region.valid());
        assert_eq!(region.name().len(), 254);
        assert!(region.name().starts_with('/'));
    });
}

#[test]
fn posix_create_and_cross_instance_read() {
    with_backend(true, || {
        let name = unique_name("posix-rw");
        let mut creator = SharedMemory::create(&name, 4);
        assert!(creator.valid());
        assert_eq!(creator.size(), 4);
        assert!(!creator.data().is_null());

        creator.lock();
        write_u32(&mut creator, 12345);
        creator.unlock();

        {
            let mut attacher = SharedMemory::attach(&name);
            assert!(attacher.valid());
            assert_eq!(attacher.size(), 4);

            attacher.lock();
            let seen = read_u32(&mut attacher);
            write_u32(&mut attacher, 54321);
            attacher.unlock();
            assert_eq!(seen, 12345);
        }

        creator.lock();
        let seen = read_u32(&mut creator);
        creator.unlock();
        assert_eq!(seen, 54321);
    });
}

#[test]
fn posix_second_thread_writes_value() {
    with_backend(true, || {
        let name = unique_name("posix-thread");
        let mut creator = SharedMemory::create(&name, 4);
        assert!(creator.valid());

        let writer_name = name.clone();
        let writer = thread::spawn(move || {
            let mut region = SharedMemory::attach(&writer_name);
            assert!(region.valid());
            region.lock();
            write_u32(&mut region, 54321);
            region.unlock();
        });
        writer.join().expect("writer thread panicked");

        creator.lock();
        let seen = read_u32(&mut creator);
        creator.unlock();
        assert_eq!(seen, 54321);
    });
}

#[test]
fn posix_mutual_exclusion_produces_exact_sum() {
    with_backend(true, || {
        let name = unique_name("posix-sum");
        let mut creator = SharedMemory::create(&name, 4);
        assert!(creator.valid());

        const THREADS: usize = 4;
        const INCREMENTS: u32 = 500;

        let mut workers = Vec::new();
        for _ in 0..THREADS {
            let worker_name = name.clone();
            workers.push(thread::spawn(move || {
                let mut region = SharedMemory::attach(&worker_name);
                assert!(region.valid());
                for _ in 0..INCREMENTS {
                    region.lock();
                    let value = read_u32(&mut region);
                    write_u32(&mut region, value + 1);
                    region.unlock();
                }
            }));
        }
        for worker in workers {
            worker.join().expect("worker thread panicked");
        }

        creator.lock();
        let total = read_u32(&mut creator);
        creator.unlock();
        assert_eq!(total, THREADS as u32 * INCREMENTS);
    });
}

#[test]
fn posix_notify_all_wakes_every_waiter() {
    with_backend(true, || {
        let name = unique_name("posix-cond");
        let mut creator = SharedMemory::create(&name, 4);
        assert!(creator.valid());

        let woken = Arc::new(AtomicUsize::new(0));
        let mut waiters = Vec::new();
        for increment in [1u32, 2] {
            let waiter_name = name.clone();
            let waiter_woken = Arc::clone(&woken);
            waiters.push(thread::spawn(move || {
                let mut region = SharedMemory::attach(&waiter_name);
                assert!(region.valid());
                region.lock();
                region.wait();
                let value = read_u32(&mut region);
                write_u32(&mut region, value + increment);
                region.unlock();
                waiter_woken.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // Broadcast until both waiters have come through; a waiter released
        // early by a spurious wakeup still increments exactly once.
        while woken.load(Ordering::SeqCst) < 2 {
            creator.notify_all();
            thread::sleep(Duration::from_millis(10));
        }
        for waiter in waiters {
            waiter.join().expect("waiter thread panicked");
        }

        creator.lock();
        let total = read_u32(&mut creator);
        creator.unlock();
        assert_eq!(total, 3);
    });
}

#[test]
fn sysv_names_are_rooted_under_tmp() {
    with_backend(false, || {
        let region = SharedMemory::attach("ABC");
        assert!(!region.valid());
        assert_eq!(region.name(), "/tmp/ABC");
    });
}

#[test]
fn sysv_nested_directories_fail_creation() {
    with_backend(false, || {
        let region = SharedMemory::create("/tmp/nested/folders/not/supported", 4);
        assert!(!region.valid());
        assert_eq!(region.size(), 0);
        assert!(region.data().is_null());
        assert_eq!(region.name(), "/tmp/nested/folders/not/supported");
    });
}

#[test]
fn sysv_create_and_cross_instance_read() {
    with_backend(false, || {
        let name = unique_name("sysv-rw");
        let mut creator = SharedMemory::create(&name, 4);
        assert!(creator.valid());
        assert_eq!(creator.size(), 4);
        assert_eq!(creator.name(), format!("/tmp/{}", name));

        creator.lock();
        write_u32(&mut creator, 12345);
        creator.unlock();

        {
            let mut attacher = SharedMemory::attach(&name);
            assert!(attacher.valid());
            assert_eq!(attacher.size(), 4);
            attacher.lock();
            assert_eq!(read_u32(&mut attacher), 12345);
            attacher.unlock();
        }

        assert!(creator.valid());
    });
}

#[test]
fn sysv_second_creator_displaces_first_instance() {
    with_backend(false, || {
        let name = unique_name("sysv-displace");
        let mut first = SharedMemory::create(&name, 4);
        assert!(first.valid());
        first.lock();
        write_u32(&mut first, 12345);
        first.unlock();

        {
            let mut second = SharedMemory::create(&name, 4);
            assert!(second.valid());
            second.lock();
            write_u32(&mut second, 23456);
            second.unlock();
        }

        // The displaced instance notices on its next lock attempt and every
        // further operation is a no-op.
        assert!(first.valid());
        first.lock();
        assert!(!first.valid());
        first.unlock();
        assert!(!first.valid());
        first.wait();
        assert!(!first.valid());
        first.notify_all();
        assert!(!first.valid());
    });
}

#[test]
fn sysv_notify_all_wakes_every_waiter() {
    with_backend(false, || {
        let name = unique_name("sysv-cond");
        let mut creator = SharedMemory::create(&name, 4);
        assert!(creator.valid());

        let woken = Arc::new(AtomicUsize::new(0));
        let mut waiters = Vec::new();
        for increment in [1u32, 2] {
            let waiter_name = name.clone();
            let waiter_woken = Arc::clone(&woken);
            waiters.push(thread::spawn(move || {
                let mut region = SharedMemory::attach(&waiter_name);
                assert!(region.valid());
                region.lock();
                region.wait();
                let value = read_u32(&mut region);
                write_u32(&mut region, value + increment);
                region.unlock();
                waiter_woken.fetch_add(1, Ordering::SeqCst);
            }));
        }

        while woken.load(Ordering::SeqCst) < 2 {
            creator.notify_all();
            thread::sleep(Duration::from_millis(10));
        }
        for waiter in waiters {
            waiter.join().expect("waiter thread panicked");
        }

        creator.lock();
        let total = read_u32(&mut creator);
        creator.unlock();
        assert_eq!(total, 3);
    });
}

use crate::error::{Error, Result};
use log::debug;
use nix::errno::Errno;
use std::ffi::CString;

/// A named POSIX semaphore used as a binary, process-shared mutex.
///
/// There is no owner-death detection: a process dying between [NamedMutex::acquire] and
/// [MutexGuard::release] leaves every other user blocked forever.
pub struct NamedMutex {
    name: CString,
    sem: *mut libc::sem_t,
}

// SAFETY: the semaphore lives in shared memory and its operations are thread safe.
unsafe impl Send for NamedMutex {}

impl NamedMutex {
    /// Creates the semaphore with value 1, replacing a stale one left behind by an earlier run.
    pub fn create(name: &str) -> Result<Self> {
        unlink(name)?;
        Self::open_with(name, libc::O_CREAT | libc::O_EXCL)
    }

    /// Opens the semaphore, creating it with value 1 if nobody has yet.
    pub fn open(name: &str) -> Result<Self> {
        Self::open_with(name, libc::O_CREAT)
    }

    fn open_with(name: &str, flags: libc::c_int) -> Result<Self> {
        let name = CString::new(name).map_err(|_| Error::sys("naming mutex", Errno::EINVAL))?;
        let mode = (libc::S_IRUSR | libc::S_IWUSR) as libc::c_uint;
        // SAFETY: `name` is a valid C string, mode and initial value match the variadic ABI.
        let sem = unsafe { libc::sem_open(name.as_ptr(), flags, mode, 1 as libc::c_uint) };
        if sem == libc::SEM_FAILED {
            return Err(Error::last_os("opening mutex"));
        }
        Ok(Self { name, sem })
    }

    pub fn name(&self) -> &str {
        self.name.to_str().unwrap_or_default()
    }

    /// Blocks until the mutex is free. Interrupted waits are resumed.
    pub fn acquire(&self) -> Result<MutexGuard<'_>> {
        loop {
            // SAFETY: `sem` came from a successful sem_open and is closed only on drop.
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(MutexGuard {
                    mutex: self,
                    released: false,
                });
            }
            match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(Error::sys("acquiring mutex", errno)),
            }
        }
    }

    /// Takes the mutex only if nobody holds it.
    pub fn try_acquire(&self) -> Result<Option<MutexGuard<'_>>> {
        // SAFETY: as in `acquire`.
        if unsafe { libc::sem_trywait(self.sem) } == 0 {
            return Ok(Some(MutexGuard {
                mutex: self,
                released: false,
            }));
        }
        match Errno::last() {
            Errno::EAGAIN => Ok(None),
            errno => Err(Error::sys("acquiring mutex", errno)),
        }
    }

    fn post(&self) -> Result<()> {
        // SAFETY: as in `acquire`.
        if unsafe { libc::sem_post(self.sem) } == -1 {
            return Err(Error::last_os("releasing mutex"));
        }
        Ok(())
    }

    /// Closes this process's handle. The name stays until [unlink].
    pub fn close(self) -> Result<()> {
        let sem = self.sem;
        std::mem::forget(self);
        // SAFETY: `sem` is still open, forgetting `self` prevents a second close.
        if unsafe { libc::sem_close(sem) } == -1 {
            return Err(Error::last_os("closing mutex"));
        }
        Ok(())
    }
}

impl Drop for NamedMutex {
    fn drop(&mut self) {
        // SAFETY: `sem` is still open.
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

/// Proof of holding a [NamedMutex]. Prefer [MutexGuard::release] so a failing post is
/// reported; dropping the guard releases on a best-effort basis.
pub struct MutexGuard<'a> {
    mutex: &'a NamedMutex,
    released: bool,
}

impl MutexGuard<'_> {
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.mutex.post()
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.mutex.post();
        }
    }
}

/// Removes a semaphore name. A missing name is not an error.
pub fn unlink(name: &str) -> Result<()> {
    let c_name = CString::new(name).map_err(|_| Error::sys("naming mutex", Errno::EINVAL))?;
    // SAFETY: `c_name` is a valid C string.
    if unsafe { libc::sem_unlink(c_name.as_ptr()) } == -1 {
        return match Errno::last() {
            Errno::ENOENT => Ok(()),
            errno => Err(Error::sys("unlinking mutex", errno)),
        };
    }
    debug!("unlinked mutex {name}");
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::mutex::{unlink, NamedMutex};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn unique(name: &str) -> String {
        format!("/shared_canvas_test_{}_{name}", std::process::id())
    }

    #[test]
    fn acquire_and_release() {
        let name = unique("mutex_basic");
        let mutex = NamedMutex::create(&name).unwrap();
        let guard = mutex.acquire().unwrap();
        assert!(mutex.try_acquire().unwrap().is_none());
        guard.release().unwrap();
        let guard = mutex.try_acquire().unwrap();
        assert!(guard.is_some());
        drop(guard);
        assert!(mutex.try_acquire().unwrap().is_some());
        mutex.close().unwrap();
        unlink(&name).unwrap();
    }

    #[test]
    fn create_resets_a_stale_semaphore() {
        let name = unique("mutex_stale");
        let stale = NamedMutex::create(&name).unwrap();
        std::mem::forget(stale.acquire().unwrap());
        stale.close().unwrap();

        let fresh = NamedMutex::create(&name).unwrap();
        assert!(fresh.try_acquire().unwrap().is_some());
        fresh.close().unwrap();
        unlink(&name).unwrap();
    }

    #[test]
    fn unlinking_a_missing_name_is_fine() {
        unlink(&unique("never_created")).unwrap();
    }

    #[test]
    fn never_two_holders_at_once() {
        let name = unique("mutex_exclusion");
        let creator = NamedMutex::create(&name).unwrap();
        let inside = Arc::new(AtomicUsize::new(0));
        let violations = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let name = name.clone();
                let inside = inside.clone();
                let violations = violations.clone();
                thread::spawn(move || {
                    let mutex = NamedMutex::open(&name).unwrap();
                    for _ in 0..50 {
                        let guard = mutex.acquire().unwrap();
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        guard.release().unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(violations.load(Ordering::SeqCst), 0);
        creator.close().unwrap();
        unlink(&name).unwrap();
    }
}

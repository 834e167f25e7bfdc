use crate::error::{Error, Result};
use log::debug;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use std::ffi::c_void;
use std::fs::File;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

/// A POSIX shared memory object mapped read/write into this process.
pub struct ShmRegion {
    name: String,
    ptr: NonNull<c_void>,
    len: NonZeroUsize,
    mapped: bool,
}

// SAFETY: the mapping is plain memory owned by this value, access goes through `&mut self`.
unsafe impl Send for ShmRegion {}

impl ShmRegion {
    /// Opens `name`, creating it if needed, and makes sure it is at least `len` bytes long
    /// before mapping it. A fresh object is zero filled.
    pub fn open(name: &str, len: usize) -> Result<Self> {
        let len = NonZeroUsize::new(len).ok_or_else(|| Error::sys("sizing canvas", Errno::EINVAL))?;
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o666),
        )
        .map_err(|e| Error::sys("opening canvas", e))?;
        let file = File::from(fd);

        let current = file
            .metadata()
            .map_err(|e| Error::io("inspecting canvas", e))?
            .len();
        if current < len.get() as u64 {
            if let Err(e) = file.set_len(len.get() as u64) {
                let _ = shm_unlink(name);
                return Err(Error::io("sizing canvas", e));
            }
        }

        // SAFETY: a fresh shared mapping of an object we just sized, no existing memory is
        // aliased.
        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &file,
                0,
            )
        };
        let ptr = match ptr {
            Ok(ptr) => ptr,
            Err(e) => {
                let _ = shm_unlink(name);
                return Err(Error::sys("mapping canvas", e));
            }
        };
        debug!("mapped {name} ({} bytes)", len.get());

        Ok(Self {
            name: name.to_string(),
            ptr,
            len,
            mapped: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len.get()
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr().cast()
    }

    /// Unmaps the region and, if asked to, removes its name.
    pub fn close(mut self, unlink_name: bool) -> Result<()> {
        self.mapped = false;
        // SAFETY: the mapping is live and nothing borrows it once `self` is consumed.
        unsafe { munmap(self.ptr, self.len.get()) }.map_err(|e| Error::sys("unmapping canvas", e))?;
        if unlink_name {
            unlink(&self.name)?;
        }
        Ok(())
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        if self.mapped {
            // SAFETY: still mapped, and this is the last use.
            let _ = unsafe { munmap(self.ptr, self.len.get()) };
        }
    }
}

/// Removes a shared memory name. A missing name is not an error.
pub fn unlink(name: &str) -> Result<()> {
    match shm_unlink(name) {
        Ok(()) => {
            debug!("unlinked canvas {name}");
            Ok(())
        }
        Err(Errno::ENOENT) => Ok(()),
        Err(e) => Err(Error::sys("unlinking canvas", e)),
    }
}

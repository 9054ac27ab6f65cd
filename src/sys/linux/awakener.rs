use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use libc;
use sys::err::cvt;

// Two 8-byte sentinels share the eventfd: a benign wake keeps the low
// byte zero, a shutdown request sets it.
const TRIGGER: u64 = 0x0100_0000_0000_0000;
const SHUTDOWN: u64 = 0x1;

#[derive(Debug)]
pub struct Awakener {
    event_fd: RawFd,
}

impl Awakener {
    #[inline]
    pub fn new() -> io::Result<Self> {
        let res = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        Ok(Awakener {
            event_fd: cvt(res)?,
        })
    }

    #[inline]
    pub fn trigger(&self) -> io::Result<()> {
        self.write(TRIGGER)
    }

    #[inline]
    pub fn shutdown(&self) -> io::Result<()> {
        self.write(SHUTDOWN)
    }

    #[inline]
    pub fn drain(&self) -> io::Result<u64> {
        let mut data = 0u64;
        let res = unsafe { libc::read(self.event_fd, &mut data as *mut _ as *mut _, 8) };
        match res {
            8 => Ok(data),
            n if n < 0 => Err(io::Error::last_os_error()),
            _ => {
                error!("Error to drain {:?}, read: {}", self, res);
                Ok(0)
            }
        }
    }

    fn write(&self, data: u64) -> io::Result<()> {
        let res = unsafe { libc::write(self.event_fd, &data as *const _ as *const _, 8) };
        match res {
            8 => Ok(()),
            n if n < 0 => Err(io::Error::last_os_error()),
            _ => {
                error!("Error to wake {:?}, written: {}", self, res);
                Ok(())
            }
        }
    }

    #[inline]
    pub fn close(&self) {
        let res = unsafe { libc::close(self.event_fd) };
        cvt(res)
            .map(drop)
            .unwrap_or_else(|e| error!("Failed to close {:?}: {}", self, e));
    }
}

impl AsRawFd for Awakener {
    #[inline]
    fn as_raw_fd(&self) -> RawFd {
        self.event_fd
    }
}

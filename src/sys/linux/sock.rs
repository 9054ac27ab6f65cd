use std::fmt;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::ptr;

use libc;
use sys::err::cvt;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct IoVec {
    inner: libc::iovec,
}

impl IoVec {
    #[inline]
    pub fn empty() -> Self {
        IoVec {
            inner: libc::iovec {
                iov_base: ptr::null_mut(),
                iov_len: 0,
            },
        }
    }

    #[inline]
    pub fn from_mut(slice: &mut [u8]) -> Self {
        IoVec {
            inner: libc::iovec {
                iov_base: slice.as_mut_ptr() as *mut _,
                iov_len: slice.len(),
            },
        }
    }

    #[inline]
    pub fn from_ref(slice: &[u8]) -> Self {
        IoVec {
            inner: libc::iovec {
                iov_base: slice.as_ptr() as *mut _,
                iov_len: slice.len(),
            },
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.iov_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.iov_len == 0
    }
}

impl fmt::Debug for IoVec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ iov_base: 0x{:08x}, iov_len: {} }}",
            self.inner.iov_base as usize, self.inner.iov_len as usize
        )
    }
}

#[inline]
pub fn readv(fd: RawFd, iovs: &[IoVec]) -> io::Result<usize> {
    let res = unsafe {
        libc::readv(
            fd,
            iovs.as_ptr() as *const libc::iovec,
            iovs.len() as libc::c_int,
        )
    };
    Ok(cvt(res)? as usize)
}

#[inline]
pub fn sendmsg(fd: RawFd, iovs: &[IoVec], zero_copy: bool) -> io::Result<usize> {
    let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
    hdr.msg_iov = iovs.as_ptr() as *mut libc::iovec;
    hdr.msg_iovlen = iovs.len() as _;
    let mut flags = libc::MSG_NOSIGNAL;
    if zero_copy {
        flags |= libc::MSG_ZEROCOPY;
    }
    let res = unsafe { libc::sendmsg(fd, &hdr, flags) };
    Ok(cvt(res)? as usize)
}

// Probes the error queue with no payload buffers; distinguishes a real
// socket error from the completion notice of a zero-copy send.
#[inline]
pub fn recvmsg_errqueue(fd: RawFd) -> io::Result<usize> {
    let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
    let res = unsafe { libc::recvmsg(fd, &mut hdr, libc::MSG_ERRQUEUE) };
    Ok(cvt(res)? as usize)
}

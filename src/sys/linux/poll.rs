use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::ptr;

use libc;
use sys::err::cvt;

bitflags! {
    pub struct Ops: u32 {
        const IN    = libc::EPOLLIN as u32;
        const OUT   = libc::EPOLLOUT as u32;
        const ERR   = libc::EPOLLERR as u32;
        const HUP   = libc::EPOLLHUP as u32;
        const RDHUP = libc::EPOLLRDHUP as u32;
        const ET    = libc::EPOLLET as u32;
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Event {
    inner: libc::epoll_event,
}

impl Event {
    #[inline]
    fn new(ops: Ops, data: u64) -> Self {
        Event {
            inner: libc::epoll_event {
                events: ops.bits(),
                u64: data,
            },
        }
    }

    #[inline]
    pub fn data(&self) -> u64 {
        self.inner.u64
    }

    #[inline]
    pub fn ops(&self) -> Ops {
        Ops::from_bits_truncate(self.inner.events)
    }
}

impl Default for Event {
    #[inline]
    fn default() -> Self {
        unsafe { mem::zeroed() }
    }
}

#[derive(Debug)]
pub struct Selector {
    epfd: RawFd,
}

impl Selector {
    #[inline]
    pub fn new() -> io::Result<Self> {
        let res = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        Ok(Selector { epfd: cvt(res)? })
    }

    #[inline]
    pub fn select(&self, events: &mut [Event], millis: i32) -> io::Result<usize> {
        let event_ptr = events.as_mut_ptr() as *mut libc::epoll_event;
        let len = events.len() as libc::c_int;
        let res = unsafe { libc::epoll_wait(self.epfd, event_ptr, len, millis) };
        Ok(cvt(res)? as usize)
    }

    #[inline]
    pub fn add(&self, fd: RawFd, ops: Ops, data: u64) -> io::Result<()> {
        let mut ev = Event::new(ops, data);
        let res = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, fd, &mut ev.inner) };
        cvt(res).map(drop)
    }

    #[inline]
    pub fn modify(&self, fd: RawFd, ops: Ops, data: u64) -> io::Result<()> {
        let mut ev = Event::new(ops, data);
        let res = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_MOD, fd, &mut ev.inner) };
        cvt(res).map(drop)
    }

    #[inline]
    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        let res = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut()) };
        cvt(res).map(drop)
    }

    #[inline]
    pub fn close(&self) {
        let res = unsafe { libc::close(self.epfd) };
        cvt(res)
            .map(drop)
            .unwrap_or_else(|e| error!("Failed to close epoll fd {}: {}", self.epfd, e));
    }
}

use std::fmt;
use std::io;
use std::mem;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use sys;
use sys::Ops;

mod barrier;
mod cache;
mod operator;

use self::barrier::{Barrier, BARRIER_CAPS};
use self::cache::OpCache;

pub use self::cache::Token;
pub use self::operator::{Ack, Inputs, OnEvent, Operator, Outputs};
pub use sys::IoVec;

const INIT_EVENTS: usize = 128;
const MAX_EVENTS: usize = 128 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    // ADD, level-triggered input; a server registers an accepted
    // connection (or a listener) and waits for read
    Readable,
    // ADD, edge-triggered output; a client registers a connecting
    // socket and waits for the connect to finish
    Writable,
    // MOD, wait for read again
    ModReadable,
    // DEL, deregister
    Detach,
    // MOD, read to read-write
    R2Rw,
    // MOD, read-write back to read
    Rw2R,
}

#[derive(Clone)]
pub struct Poller {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    id: usize,
    selector: sys::Selector,
    awakener: sys::Awakener,
    trigger: AtomicU32,
    zero_copy: bool,
    closed: AtomicBool,
    opcache: OpCache,
}

impl Poller {
    #[inline]
    pub fn new() -> io::Result<Self> {
        Poller::with_zero_copy(false)
    }

    pub fn with_zero_copy(zero_copy: bool) -> io::Result<Self> {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        let selector = sys::Selector::new()?;
        let awakener = match sys::Awakener::new() {
            Ok(awakener) => awakener,
            Err(e) => {
                selector.close();
                return Err(e);
            }
        };
        let poll = Poller {
            inner: Arc::new(Inner {
                id: SEQ.fetch_add(1, Ordering::Relaxed),
                selector: selector,
                awakener: awakener,
                trigger: AtomicU32::new(0),
                zero_copy: zero_copy,
                closed: AtomicBool::new(false),
                opcache: OpCache::new(),
            }),
        };
        let wop = poll.alloc();
        wop.fd = poll.inner.awakener.as_raw_fd();
        poll.control(wop, PollEvent::Readable)?;
        Ok(poll)
    }

    // Reactor loop; entered by exactly one thread.
    pub fn wait(&self) -> io::Result<()> {
        let caps = BARRIER_CAPS;
        let mut size = INIT_EVENTS;
        let mut events = vec![sys::Event::default(); size];
        let mut barriers: Vec<Barrier> = (0..size).map(|_| Barrier::new(caps)).collect();
        let mut hups: Vec<OnEvent> = Vec::new();
        let mut msec = -1;
        let mut n = 0;
        loop {
            if n == size && size < MAX_EVENTS {
                size <<= 1;
                events = vec![sys::Event::default(); size];
                barriers = (0..size).map(|_| Barrier::new(caps)).collect();
            }
            n = match self.inner.selector.select(&mut events, msec) {
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => 0,
                Err(e) => return Err(e),
            };
            if n == 0 {
                // a wake-up (e.g. a signal) that produced no events
                msec = -1;
                thread::yield_now();
                continue;
            }
            msec = 0;
            if self.handle(&events[..n], &mut barriers, &mut hups) {
                return Ok(());
            }
            // no operator of this batch is referenced past this point
            self.inner.opcache.free();
        }
    }

    fn handle(&self, events: &[sys::Event], barriers: &mut [Barrier], hups: &mut Vec<OnEvent>) -> bool {
        for (i, event) in events.iter().enumerate() {
            let operator = match self.inner.opcache.resolve(Token::from(event.data())) {
                Some(op) => unsafe { &mut *op },
                None => continue,
            };
            if !operator.begin() {
                continue;
            }

            // trigger or exit gracefully
            if operator.fd == self.inner.awakener.as_raw_fd() {
                // drain the eventfd before clearing the trigger flag
                let data = self.inner.awakener.drain().unwrap_or_else(|e| {
                    error!("Failed to drain {}: {}", self, e);
                    0
                });
                self.inner.trigger.store(0, Ordering::SeqCst);
                if data & 0xff != 0 {
                    self.inner.closed.store(true, Ordering::SeqCst);
                    self.inner.awakener.close();
                    self.inner.selector.close();
                    operator.done();
                    return true;
                }
                operator.done();
                continue;
            }

            let evt = event.ops();

            if evt.contains(Ops::IN) {
                if operator.on_read.is_some() {
                    // non-connection fd, e.g. a listener
                    operator.read_ready(self);
                } else if operator.inputs.is_some() {
                    let iovs = barriers[i].as_mut_slice();
                    let k = operator.fill_inputs(iovs);
                    if k > 0 {
                        match sys::readv(operator.fd, &iovs[..k]) {
                            Ok(n) => operator.ack_input(n),
                            Err(e) => {
                                operator.ack_input(0);
                                if e.kind() != io::ErrorKind::WouldBlock
                                    && e.kind() != io::ErrorKind::Interrupted
                                {
                                    error!("readv(fd={}) failed: {}", operator.fd, e);
                                    self.append_hup(operator, hups);
                                    continue;
                                }
                            }
                        }
                    }
                } else {
                    error!(
                        "operator has no input interface: fd={}, events={:?}",
                        operator.fd, evt
                    );
                }
            }

            // data and a pending FIN arrive on the same wake-up; input has
            // been drained above, so teardown may proceed
            if evt.intersects(Ops::HUP | Ops::RDHUP) {
                self.append_hup(operator, hups);
                continue;
            }

            if evt.contains(Ops::ERR) {
                // a zero-copy send completion surfaces as ERR with an empty
                // error queue
                match sys::recvmsg_errqueue(operator.fd) {
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => operator.done(),
                    _ => self.append_hup(operator, hups),
                }
                continue;
            }

            if evt.contains(Ops::OUT) {
                if operator.on_write.is_some() {
                    operator.write_ready(self);
                } else if operator.outputs.is_some() {
                    let iovs = barriers[i].as_mut_slice();
                    let (k, zero_copy) = operator.fill_outputs(iovs);
                    if k > 0 {
                        let zc = self.inner.zero_copy && zero_copy;
                        match sys::sendmsg(operator.fd, &iovs[..k], zc) {
                            Ok(n) => operator.ack_output(n),
                            Err(e) => {
                                operator.ack_output(0);
                                if e.kind() != io::ErrorKind::WouldBlock {
                                    error!("sendmsg(fd={}) failed: {}", operator.fd, e);
                                    self.append_hup(operator, hups);
                                    continue;
                                }
                            }
                        }
                    }
                } else {
                    error!(
                        "operator has no output interface: fd={}, events={:?}",
                        operator.fd, evt
                    );
                }
            }

            operator.done();
        }
        // run collected hang-ups off the reactor
        self.detaches(hups);
        false
    }

    fn append_hup(&self, operator: &mut Operator, hups: &mut Vec<OnEvent>) {
        if let Some(on_hup) = operator.take_on_hup() {
            hups.push(on_hup);
        }
        if let Err(e) = self.inner.control(operator, PollEvent::Detach) {
            error!("Failed to detach operator (fd={}): {}", operator.fd, e);
        }
        operator.done();
    }

    fn detaches(&self, hups: &mut Vec<OnEvent>) {
        if hups.is_empty() {
            return;
        }
        let mut on_hups = mem::replace(hups, Vec::new());
        let poll = self.clone();
        thread::spawn(move || {
            for on_hup in &mut on_hups {
                if let Err(e) = on_hup(&poll) {
                    error!("Hang-up callback failed: {}", e);
                }
            }
        });
    }

    #[inline]
    pub fn control(&self, operator: &mut Operator, event: PollEvent) -> io::Result<()> {
        self.inner.control(operator, event)
    }

    #[inline]
    pub fn trigger(&self) -> io::Result<()> {
        // only the 0 -> 1 transition writes; concurrent triggers coalesce
        if self.inner.trigger.fetch_add(1, Ordering::SeqCst) > 0 {
            return Ok(());
        }
        self.inner.awakener.trigger()
    }

    #[inline]
    pub fn close(&self) -> io::Result<()> {
        self.inner.awakener.shutdown()
    }

    #[inline]
    pub fn alloc(&self) -> &mut Operator {
        let op = self.inner.opcache.alloc(Arc::downgrade(&self.inner));
        unsafe { &mut *op }
    }

    #[inline]
    pub fn free(&self, operator: &mut Operator) {
        operator.unused();
        self.inner.opcache.freeable(operator.token());
    }
}

impl Inner {
    pub(crate) fn control(&self, operator: &mut Operator, event: PollEvent) -> io::Result<()> {
        let data = u64::from(operator.token());
        match event {
            PollEvent::Readable => {
                operator.inuse();
                self.selector
                    .add(operator.fd, Ops::IN | Ops::RDHUP | Ops::ERR, data)
            }
            PollEvent::Writable => {
                operator.inuse();
                self.selector
                    .add(operator.fd, Ops::ET | Ops::OUT | Ops::RDHUP | Ops::ERR, data)
            }
            PollEvent::ModReadable => self
                .selector
                .modify(operator.fd, Ops::IN | Ops::RDHUP | Ops::ERR, data),
            PollEvent::R2Rw => self.selector.modify(
                operator.fd,
                Ops::IN | Ops::OUT | Ops::RDHUP | Ops::ERR,
                data,
            ),
            PollEvent::Rw2R => self
                .selector
                .modify(operator.fd, Ops::IN | Ops::RDHUP | Ops::ERR, data),
            PollEvent::Detach => self.selector.delete(operator.fd),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            self.awakener.close();
            self.selector.close();
        }
    }
}

impl fmt::Display for Poller {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "woliu-poll-{}", self.inner.id)
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "woliu-poll-{}", self.inner.id)
    }
}

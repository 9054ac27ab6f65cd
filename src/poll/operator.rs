use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Weak;
use std::thread;

use poll::cache::Token;
use poll::{Inner, PollEvent, Poller};
use sys::IoVec;

pub type OnEvent = Box<dyn FnMut(&Poller) -> io::Result<()> + Send>;
pub type Inputs = Box<dyn FnMut(&mut [IoVec]) -> usize + Send>;
pub type Outputs = Box<dyn FnMut(&mut [IoVec]) -> (usize, bool) + Send>;
pub type Ack = Box<dyn FnMut(usize) -> io::Result<()> + Send>;

const UNUSED: i32 = 0;
const INUSE: i32 = 1;
const PROCESSING: i32 = 2;

pub struct Operator {
    pub fd: RawFd,
    pub on_read: Option<OnEvent>,
    pub on_write: Option<OnEvent>,
    pub on_hup: Option<OnEvent>,
    pub inputs: Option<Inputs>,
    pub input_ack: Option<Ack>,
    pub outputs: Option<Outputs>,
    pub output_ack: Option<Ack>,
    pub(crate) generation: u32,
    pub(crate) retired: bool,
    token: Token,
    poll: Weak<Inner>,
    state: AtomicI32,
}

impl Operator {
    pub(crate) fn new(generation: u32, token: Token, poll: Weak<Inner>) -> Self {
        Operator {
            fd: -1,
            on_read: None,
            on_write: None,
            on_hup: None,
            inputs: None,
            input_ack: None,
            outputs: None,
            output_ack: None,
            generation: generation,
            retired: false,
            token: token,
            poll: poll,
            state: AtomicI32::new(UNUSED),
        }
    }

    #[inline]
    pub fn token(&self) -> Token {
        self.token
    }

    #[inline]
    pub fn control(&mut self, event: PollEvent) -> io::Result<()> {
        match self.poll.upgrade() {
            Some(inner) => inner.control(self, event),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "owning poller is gone",
            )),
        }
    }

    pub(crate) fn reset(&mut self, token: Token, poll: Weak<Inner>) {
        self.fd = -1;
        self.on_read = None;
        self.on_write = None;
        self.on_hup = None;
        self.inputs = None;
        self.input_ack = None;
        self.outputs = None;
        self.output_ack = None;
        self.retired = false;
        self.token = token;
        self.poll = poll;
        self.state.store(UNUSED, Ordering::SeqCst);
    }

    // Drops the user callbacks when the slot goes back to the free list.
    pub(crate) fn clear(&mut self) {
        self.fd = -1;
        self.on_read = None;
        self.on_write = None;
        self.on_hup = None;
        self.inputs = None;
        self.input_ack = None;
        self.outputs = None;
        self.output_ack = None;
        self.poll = Weak::new();
    }

    pub(crate) fn inuse(&self) {
        loop {
            match self
                .state
                .compare_exchange(UNUSED, INUSE, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) | Err(INUSE) => return,
                Err(_) => thread::yield_now(),
            }
        }
    }

    pub(crate) fn unused(&self) {
        loop {
            match self
                .state
                .compare_exchange(INUSE, UNUSED, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) | Err(UNUSED) => return,
                Err(_) => thread::yield_now(),
            }
        }
    }

    #[inline]
    pub(crate) fn begin(&self) -> bool {
        self.state
            .compare_exchange(INUSE, PROCESSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    #[inline]
    pub(crate) fn done(&self) {
        self.state.store(INUSE, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn is_unused(&self) -> bool {
        self.state.load(Ordering::SeqCst) == UNUSED
    }

    pub(crate) fn read_ready(&mut self, poll: &Poller) {
        if let Some(ref mut on_read) = self.on_read {
            if let Err(e) = on_read(poll) {
                error!("on_read(fd={}) failed: {}", self.fd, e);
            }
        }
    }

    pub(crate) fn write_ready(&mut self, poll: &Poller) {
        if let Some(ref mut on_write) = self.on_write {
            if let Err(e) = on_write(poll) {
                error!("on_write(fd={}) failed: {}", self.fd, e);
            }
        }
    }

    #[inline]
    pub(crate) fn fill_inputs(&mut self, iovs: &mut [IoVec]) -> usize {
        match self.inputs {
            Some(ref mut inputs) => inputs(iovs),
            None => 0,
        }
    }

    pub(crate) fn ack_input(&mut self, n: usize) {
        if let Some(ref mut input_ack) = self.input_ack {
            if let Err(e) = input_ack(n) {
                error!("input_ack(fd={}) failed: {}", self.fd, e);
            }
        }
    }

    #[inline]
    pub(crate) fn fill_outputs(&mut self, iovs: &mut [IoVec]) -> (usize, bool) {
        match self.outputs {
            Some(ref mut outputs) => outputs(iovs),
            None => (0, false),
        }
    }

    pub(crate) fn ack_output(&mut self, n: usize) {
        if let Some(ref mut output_ack) = self.output_ack {
            if let Err(e) = output_ack(n) {
                error!("output_ack(fd={}) failed: {}", self.fd, e);
            }
        }
    }

    #[inline]
    pub(crate) fn take_on_hup(&mut self) -> Option<OnEvent> {
        self.on_hup.take()
    }
}

use sys::IoVec;

// Width of one barrier: the most iovecs a single readv/sendmsg may carry.
pub(crate) const BARRIER_CAPS: usize = 32;

pub(crate) struct Barrier {
    iovs: Vec<IoVec>,
}

impl Barrier {
    #[inline]
    pub(crate) fn new(caps: usize) -> Self {
        Barrier {
            iovs: vec![IoVec::empty(); caps],
        }
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [IoVec] {
        &mut self.iovs
    }
}

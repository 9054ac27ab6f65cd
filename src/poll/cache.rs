use std::sync::{Mutex, Weak};

use poll::operator::Operator;
use poll::Inner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    val: u64,
}

impl Token {
    #[inline]
    pub(crate) fn new(generation: u32, index: u32) -> Self {
        Token {
            val: (generation as u64) << 32 | index as u64,
        }
    }

    #[inline]
    pub(crate) fn generation(self) -> u32 {
        (self.val >> 32) as u32
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.val as u32 as usize
    }
}

impl From<u64> for Token {
    #[inline]
    fn from(val: u64) -> Self {
        Token { val: val }
    }
}

impl From<Token> for u64 {
    #[inline]
    fn from(token: Token) -> Self {
        token.val
    }
}

pub(crate) struct OpCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    ops: Vec<Box<Operator>>,
    free: Vec<u32>,
    retired: Vec<u32>,
}

impl OpCache {
    pub(crate) fn new() -> Self {
        OpCache {
            inner: Mutex::new(CacheInner {
                ops: Vec::new(),
                free: Vec::new(),
                retired: Vec::new(),
            }),
        }
    }

    pub(crate) fn alloc(&self, poll: Weak<Inner>) -> *mut Operator {
        let mut cache = self.inner.lock().unwrap();
        match cache.free.pop() {
            Some(idx) => {
                let generation = cache.ops[idx as usize].generation;
                let op = &mut *cache.ops[idx as usize];
                op.reset(Token::new(generation, idx), poll);
                op as *mut Operator
            }
            None => {
                let idx = cache.ops.len() as u32;
                let mut op = Box::new(Operator::new(1, Token::new(1, idx), poll));
                let ptr = &mut *op as *mut Operator;
                cache.ops.push(op);
                ptr
            }
        }
    }

    // Stale tokens fail here, which short-circuits events delivered for
    // a slot that has already been recycled.
    pub(crate) fn resolve(&self, token: Token) -> Option<*mut Operator> {
        let mut cache = self.inner.lock().unwrap();
        let i = token.index();
        if i >= cache.ops.len() {
            return None;
        }
        let op = &mut *cache.ops[i];
        if op.generation != token.generation() {
            return None;
        }
        Some(op as *mut Operator)
    }

    pub(crate) fn freeable(&self, token: Token) {
        let mut cache = self.inner.lock().unwrap();
        let i = token.index();
        if i >= cache.ops.len() {
            return;
        }
        let CacheInner {
            ref mut ops,
            ref mut retired,
            ..
        } = *cache;
        let op = &mut *ops[i];
        if op.generation != token.generation() || op.retired {
            return;
        }
        op.retired = true;
        retired.push(i as u32);
    }

    // Runs on the reactor at each batch end; an operator still held by a
    // user thread stays retired until a later batch.
    pub(crate) fn free(&self) {
        let mut cache = self.inner.lock().unwrap();
        if cache.retired.is_empty() {
            return;
        }
        let CacheInner {
            ref mut ops,
            ref mut free,
            ref mut retired,
        } = *cache;
        retired.retain(|&idx| {
            let op = &mut *ops[idx as usize];
            if op.is_unused() {
                op.generation = op.generation.wrapping_add(1);
                op.retired = false;
                op.clear();
                free.push(idx);
                false
            } else {
                true
            }
        });
    }
}

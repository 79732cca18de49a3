use crate::{DecodeJob, PointDecoder};

use std::collections::VecDeque;

/// A bounded pool of reusable decode contexts for one point format.
///
/// Contexts are created lazily up to `capacity` and handed back after every decode, so decode
/// state is reused instead of allocated per call. When every context is out, submitted jobs wait
/// in FIFO order; `release` hands the returned context straight to the oldest waiter.
///
/// Both `acquire` and `release` run on the cooperative thread, which is what keeps the
/// availability counters single-writer.
pub struct DecoderPool {
    idle: Vec<Box<dyn PointDecoder>>,
    capacity: usize,
    outstanding: usize,
    waiters: VecDeque<DecodeJob>,
    factory: Box<dyn Fn() -> Box<dyn PointDecoder>>,
}

impl DecoderPool {
    pub fn new(capacity: usize, factory: impl Fn() -> Box<dyn PointDecoder> + 'static) -> Self {
        Self {
            idle: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            outstanding: 0,
            waiters: VecDeque::new(),
            factory: Box::new(factory),
        }
    }

    /// Take a context if one is available, creating it on first use.
    pub fn acquire(&mut self) -> Option<Box<dyn PointDecoder>> {
        if let Some(ctx) = self.idle.pop() {
            self.outstanding += 1;
            return Some(ctx);
        }
        if self.outstanding < self.capacity {
            self.outstanding += 1;
            return Some((self.factory)());
        }
        None
    }

    /// Queue a job until a context frees up.
    pub fn enqueue(&mut self, job: DecodeJob) {
        self.waiters.push_back(job);
    }

    /// Return a context. If a job is waiting, the context goes straight back out with that job;
    /// the caller must dispatch the returned pair.
    pub fn release(
        &mut self,
        ctx: Box<dyn PointDecoder>,
    ) -> Option<(Box<dyn PointDecoder>, DecodeJob)> {
        debug_assert!(self.outstanding > 0);
        if let Some(job) = self.waiters.pop_front() {
            return Some((ctx, job));
        }

        self.outstanding -= 1;
        self.idle.push(ctx);
        None
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    #[inline]
    pub fn queued(&self) -> usize {
        self.waiters.len()
    }
}

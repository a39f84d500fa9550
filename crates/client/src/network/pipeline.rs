//! Request pipeline
//!
//! The daemon answers strictly in the order requests were written and the
//! wire carries no request ID, so correlation is positional: the completion
//! at the front of the callback queue owns the next response.
//!
//! Requests are held back in the request queue when earlier requests are
//! still queued, or when pipelining is off and a response is outstanding.

use bytes::Bytes;
use std::collections::VecDeque;

/// A request that has been encoded but may not be written yet
#[derive(Debug)]
pub struct Outbound<C> {
    pub command: u32,
    pub wire: Bytes,
    pub completion: C,
}

/// A written request waiting for its response
#[derive(Debug)]
pub struct InFlight<C> {
    pub command: u32,
    pub completion: C,
}

#[derive(Debug)]
pub struct RequestPipeline<C> {
    pipelining: bool,
    requests: VecDeque<Outbound<C>>,
    callbacks: VecDeque<InFlight<C>>,
}

impl<C> RequestPipeline<C> {
    pub fn new(pipelining: bool) -> Self {
        Self {
            pipelining,
            requests: VecDeque::new(),
            callbacks: VecDeque::new(),
        }
    }

    pub fn pipelining(&self) -> bool {
        self.pipelining
    }

    /// Accept a request; returns the bytes to write now, if any
    pub fn submit(&mut self, outbound: Outbound<C>) -> Option<Bytes> {
        let hold = !self.requests.is_empty() || (!self.callbacks.is_empty() && !self.pipelining);
        if hold {
            self.requests.push_back(outbound);
            None
        } else {
            Some(self.write(outbound))
        }
    }

    /// Take the completion owning the next response
    ///
    /// `None` means a response arrived with nothing outstanding.
    pub fn complete(&mut self) -> Option<InFlight<C>> {
        self.callbacks.pop_front()
    }

    /// Release the oldest held request if the queue rules allow it
    pub fn release(&mut self) -> Option<Bytes> {
        if !(self.pipelining || self.callbacks.is_empty()) {
            return None;
        }
        let outbound = self.requests.pop_front()?;
        Some(self.write(outbound))
    }

    /// Written but unanswered
    pub fn in_flight(&self) -> usize {
        self.callbacks.len()
    }

    /// Accepted but not written
    pub fn queued(&self) -> usize {
        self.requests.len()
    }

    pub fn is_idle(&self) -> bool {
        self.requests.is_empty() && self.callbacks.is_empty()
    }

    /// Drain both queues, oldest first
    pub fn flush(&mut self) -> Vec<C> {
        self.callbacks
            .drain(..)
            .map(|f| f.completion)
            .chain(self.requests.drain(..).map(|o| o.completion))
            .collect()
    }

    fn write(&mut self, outbound: Outbound<C>) -> Bytes {
        self.callbacks.push_back(InFlight {
            command: outbound.command,
            completion: outbound.completion,
        });
        outbound.wire
    }
}

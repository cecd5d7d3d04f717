// Bounded FIFO of interleaved samples shared between the pipeline
// stages (reader -> decoder -> writer). Any number of producers and
// consumers; pushes block while the queue is full, pops block while it
// is empty. Closing wakes everyone; remaining data can still be
// drained afterwards.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

pub struct SampleQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct State {
    buf: VecDeque<f32>,
    closed: bool,
}

impl SampleQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            state: Mutex::new(State {
                buf: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a run of samples, blocking whenever the queue is full.
    /// Data pushed after `close` is silently dropped.
    pub fn push_slice(&self, data: &[f32]) {
        let mut pos = 0;
        let mut state = self.state.lock().unwrap();
        while pos < data.len() {
            if state.closed {
                return;
            }
            let room = self.capacity - state.buf.len();
            if room == 0 {
                state = self.not_full.wait(state).unwrap();
                continue;
            }
            let take = room.min(data.len() - pos);
            state.buf.extend(&data[pos..pos + take]);
            pos += take;
            self.not_empty.notify_all();
        }
    }

    /// Pop up to `max` samples, blocking while the queue is empty.
    /// Returns an empty vector only once the queue is closed and fully
    /// drained.
    pub fn pop_chunk(&self, max: usize) -> Vec<f32> {
        let mut state = self.state.lock().unwrap();
        loop {
            if !state.buf.is_empty() {
                let take = max.min(state.buf.len());
                let chunk: Vec<f32> = state.buf.drain(..take).collect();
                self.not_full.notify_all();
                return chunk;
            }
            if state.closed {
                return Vec::new();
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Mark the end of the stream and wake all blocked producers and
    /// consumers.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

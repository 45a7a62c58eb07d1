//! Admission control per executor
//!
//! Each executor name gets a counting semaphore sized by its concurrency
//! limit. A job acquires its required slot count before running and releases
//! them when its task future settles, on every exit path. Waiters are served
//! strictly in arrival order, so a large job queued behind small ones cannot
//! be starved by later arrivals slipping past it.

use crate::Result;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use tracing::debug;

/// Gates concurrent job execution per executor name
#[derive(Debug, Default)]
pub struct ResourceAllocator {
    gates: Mutex<HashMap<String, Arc<Gate>>>,
}

impl ResourceAllocator {
    /// Create an allocator with no executors registered yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a job task under the executor's concurrency limit
    ///
    /// Suspends until `required_slots` capacity units are free, runs the
    /// task, and releases the slots when the task settles. A limit of `0`
    /// means the host's logical CPU count; a slot requirement above the
    /// limit is clamped so a big job degrades to exclusive use of the
    /// executor instead of deadlocking.
    pub async fn run_server_job<F, Fut>(
        &self,
        executor: &str,
        concurrency_limit: usize,
        required_slots: usize,
        task: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let limit = if concurrency_limit == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            concurrency_limit
        };
        let slots = required_slots.clamp(1, limit);

        let gate = {
            let mut gates = self.gates.lock().unwrap();
            let gate = gates
                .entry(executor.to_string())
                .or_insert_with(|| Arc::new(Gate::new(limit)))
                .clone();
            gate.set_limit(limit);
            gate
        };

        debug!(executor, slots, limit, "waiting for job slots");
        let _guard = Acquire::new(gate, slots).await;
        debug!(executor, slots, "job slots acquired");
        task().await
    }
}

#[derive(Debug)]
struct Gate {
    state: Mutex<GateState>,
}

#[derive(Debug)]
struct GateState {
    limit: usize,
    in_use: usize,
    queue: VecDeque<Waiter>,
    next_ticket: u64,
}

#[derive(Debug)]
struct Waiter {
    ticket: u64,
    waker: Option<Waker>,
}

impl Gate {
    fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                limit,
                in_use: 0,
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
        }
    }

    /// The limit is configuration and may change between jobs; in-flight
    /// acquisitions are unaffected beyond the new headroom calculation.
    fn set_limit(&self, limit: usize) {
        let mut state = self.state.lock().unwrap();
        if state.limit != limit {
            state.limit = limit;
            state.wake_head();
        }
    }

    fn release(&self, slots: usize) {
        let mut state = self.state.lock().unwrap();
        state.in_use -= slots;
        state.wake_head();
    }
}

impl GateState {
    fn wake_head(&mut self) {
        if let Some(waiter) = self.queue.front_mut() {
            if let Some(waker) = waiter.waker.take() {
                waker.wake();
            }
        }
    }
}

/// Future resolving to a slot guard once the waiter reaches the queue head
/// and capacity is free
struct Acquire {
    gate: Arc<Gate>,
    slots: usize,
    ticket: Option<u64>,
    acquired: bool,
}

impl Acquire {
    fn new(gate: Arc<Gate>, slots: usize) -> Self {
        Self {
            gate,
            slots,
            ticket: None,
            acquired: false,
        }
    }
}

impl Future for Acquire {
    type Output = SlotGuard;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let gate = self.gate.clone();
        let mut state = gate.state.lock().unwrap();

        let ticket = match self.ticket {
            Some(ticket) => ticket,
            None => {
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                state.queue.push_back(Waiter {
                    ticket,
                    waker: None,
                });
                self.ticket = Some(ticket);
                ticket
            }
        };

        // Only the queue head may acquire; this is what makes wake order FIFO
        // rather than a thundering-herd race.
        let at_head = state.queue.front().is_some_and(|w| w.ticket == ticket);
        if at_head && state.in_use + self.slots <= state.limit {
            state.queue.pop_front();
            state.in_use += self.slots;
            // The next waiter may also fit in the remaining headroom.
            state.wake_head();
            self.acquired = true;
            return Poll::Ready(SlotGuard {
                gate: self.gate.clone(),
                slots: self.slots,
            });
        }

        if let Some(waiter) = state.queue.iter_mut().find(|w| w.ticket == ticket) {
            waiter.waker = Some(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        // A waiter dropped before acquiring (task cancelled while queued)
        // must leave the queue, or it would block everyone behind it forever.
        if self.acquired {
            return;
        }
        if let Some(ticket) = self.ticket {
            let mut state = self.gate.state.lock().unwrap();
            state.queue.retain(|w| w.ticket != ticket);
            state.wake_head();
        }
    }
}

/// Releases the acquired slots on drop
struct SlotGuard {
    gate: Arc<Gate>,
    slots: usize,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.gate.release(self.slots);
    }
}

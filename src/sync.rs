//! # Synchronization Primitives
//!
//! Critical-section helpers and the completion channel that carries
//! [`TaskCompleted`] messages from task runtimes to the supervisor.
//!
//! On Cortex-M the critical section is provided by `cortex-m`'s single-core
//! implementation (interrupts disabled); on hosted targets by the
//! `critical-section` crate's `std` implementation.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

use crate::config::MAX_TASKS;
use crate::runtime::TaskCompleted;

/// Execute a closure within a critical section.
///
/// Keep critical sections as short as possible; on Cortex-M they hold off
/// every interrupt, the scheduler tick included.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

// ---------------------------------------------------------------------------
// Completion channel
// ---------------------------------------------------------------------------

/// Bounded FIFO of completion messages, one slot per possible task.
///
/// Senders and the receiver only need `&self`, so a single
/// `static COMPLETIONS: CompletionQueue = CompletionQueue::new();` can be
/// shared between tasks and the supervisor.
pub struct CompletionQueue {
    ring: Mutex<RefCell<Ring>>,
}

struct Ring {
    slots: [Option<TaskCompleted>; MAX_TASKS],
    head: usize,
    len: usize,
}

impl CompletionQueue {
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(Ring {
                slots: [None; MAX_TASKS],
                head: 0,
                len: 0,
            })),
        }
    }

    /// Enqueue `msg`. Hands the message back if the queue is full.
    pub fn send(&self, msg: TaskCompleted) -> Result<(), TaskCompleted> {
        critical_section(|cs| {
            let mut ring = self.ring.borrow(cs).borrow_mut();
            if ring.len == MAX_TASKS {
                return Err(msg);
            }
            let tail = (ring.head + ring.len) % MAX_TASKS;
            ring.slots[tail] = Some(msg);
            ring.len += 1;
            Ok(())
        })
    }

    /// Dequeue the oldest message, if any.
    pub fn try_recv(&self) -> Option<TaskCompleted> {
        critical_section(|cs| {
            let mut ring = self.ring.borrow(cs).borrow_mut();
            if ring.len == 0 {
                return None;
            }
            let head = ring.head;
            let msg = ring.slots[head].take();
            ring.head = (head + 1) % MAX_TASKS;
            ring.len -= 1;
            msg
        })
    }

    pub fn len(&self) -> usize {
        critical_section(|cs| self.ring.borrow(cs).borrow().len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

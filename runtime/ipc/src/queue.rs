//! Intrusive FIFO of task records
//!
//! Links are the `next` field of each [`TaskHeader`]; the queue only keeps
//! head and tail addresses (0 when empty) so it can live in the shared
//! window as plain data.

use core::ptr::NonNull;

use crate::task::TaskHeader;

#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    head: usize,
    tail: usize,
    len: usize,
}

impl TaskQueue {
    pub const fn new() -> Self {
        Self { head: 0, tail: 0, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Append `task` at the tail
    ///
    /// # Safety
    /// `task` must be a live, unqueued record and every queued record must
    /// still be live.
    pub unsafe fn push(&mut self, task: NonNull<TaskHeader>) {
        let addr = task.as_ptr() as usize;
        (*task.as_ptr()).next = 0;
        if self.tail == 0 {
            self.head = addr;
        } else {
            (*(self.tail as *mut TaskHeader)).next = addr;
        }
        self.tail = addr;
        self.len += 1;
    }

    /// Detach the head record
    ///
    /// # Safety
    /// Every queued record must still be live.
    pub unsafe fn pop(&mut self) -> Option<NonNull<TaskHeader>> {
        let task = NonNull::new(self.head as *mut TaskHeader)?;
        self.head = (*task.as_ptr()).next;
        if self.head == 0 {
            self.tail = 0;
        }
        (*task.as_ptr()).next = 0;
        self.len -= 1;
        Some(task)
    }
}

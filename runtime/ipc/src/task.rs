//! Task records
//!
//! A task lives in the shared heap as a [`TaskHeader`] followed inline by
//! its argument bytes. The consuming core sees it only through a
//! [`TaskHandle`], which `complete` consumes.

use core::fmt;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use duet_platform::layout::HEAP_ALIGN;
use static_assertions::const_assert;

/// Task callback, run on the consuming core with the task's argument bytes
///
/// Both cores must run the same firmware image so the function address is
/// valid on either side.
pub type TaskFn = fn(&[u8]);

pub(crate) const STATE_PENDING: u8 = 0x50;
pub(crate) const STATE_EXECUTING: u8 = 0xE0;
pub(crate) const STATE_RETIRED: u8 = 0xDD;

/// In-band task record header
#[repr(C)]
pub(crate) struct TaskHeader {
    pub func: TaskFn,
    /// Address of the next queued task, 0 at the tail
    pub next: usize,
    pub id: u32,
    pub arg_len: u32,
    pub state: u8,
    _reserved: [u8; 3],
}

pub(crate) const TASK_HEADER_SIZE: usize = size_of::<TaskHeader>();

const_assert!(align_of::<TaskHeader>() <= HEAP_ALIGN);
const_assert!(TASK_HEADER_SIZE % HEAP_ALIGN == 0);

impl TaskHeader {
    pub fn new(func: TaskFn, id: TaskId, arg_len: u32) -> Self {
        Self {
            func,
            next: 0,
            id: id.0,
            arg_len,
            state: STATE_PENDING,
            _reserved: [0; 3],
        }
    }
}

/// Identifier handed back by `submit`, unique per shared region until wrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u32);

impl TaskId {
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// A task detached from the queue and marked executing
///
/// Owned by the core that took it from `next`; must be handed to
/// `complete` to return its memory.
#[must_use = "a task handle must be completed to free its record"]
pub struct TaskHandle {
    header: NonNull<TaskHeader>,
}

impl TaskHandle {
    /// # Safety
    /// `header` must point to a detached, executing task record
    pub(crate) unsafe fn from_raw(header: NonNull<TaskHeader>) -> Self {
        Self { header }
    }

    pub(crate) fn into_raw(self) -> NonNull<TaskHeader> {
        self.header
    }

    fn header(&self) -> &TaskHeader {
        // SAFETY: the record stays allocated until `complete` consumes the handle
        unsafe { self.header.as_ref() }
    }

    pub fn id(&self) -> TaskId {
        TaskId(self.header().id)
    }

    /// Argument bytes copied in at submission (empty if none were given)
    pub fn arg(&self) -> &[u8] {
        let len = self.header().arg_len as usize;
        // SAFETY: submission allocated header + arg_len bytes and copied the
        // argument right behind the header
        unsafe {
            let data = self.header.as_ptr().cast::<u8>().add(TASK_HEADER_SIZE);
            core::slice::from_raw_parts(data, len)
        }
    }

    /// Run the callback on the argument bytes
    pub fn execute(&self) {
        (self.header().func)(self.arg());
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("addr", &self.header)
            .field("arg_len", &self.header().arg_len)
            .finish()
    }
}

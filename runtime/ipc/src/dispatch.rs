//! Dispatcher - the task queue as seen from one core
//!
//! # Design
//! - Queue and shared heap sit together behind the `"task_queue"` hardware
//!   lock, so a task record is allocated and linked under one critical
//!   section
//! - `submit` rings the peer core after the lock is dropped
//! - Callbacks run outside the lock; the record is detached by then

use duet_allocator::{Heap, HeapStats};
use duet_hwsem::Semaphores;
use duet_platform::{CoreId, Doorbell, HwSemaphore};

use crate::queue::TaskQueue;
use crate::task::{TaskFn, TaskHandle, TaskHeader, TaskId, STATE_EXECUTING, STATE_PENDING, STATE_RETIRED, TASK_HEADER_SIZE};
use crate::{DispatchError, Result, SharedRegion};

/// Shared heap plus the pending-task queue
#[derive(Debug)]
pub(crate) struct DispatchState {
    pub heap: Heap,
    pub queue: TaskQueue,
    next_id: u32,
}

impl DispatchState {
    pub fn new(heap: Heap) -> Self {
        Self {
            heap,
            queue: TaskQueue::new(),
            next_id: 0,
        }
    }

    fn take_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

/// Task submission and consumption for one core
pub struct Dispatcher<'a, H: HwSemaphore + ?Sized, D: Doorbell + ?Sized> {
    region: &'a SharedRegion,
    hw: &'a H,
    doorbell: &'a D,
    core: CoreId,
}

impl<'a, H: HwSemaphore + ?Sized, D: Doorbell + ?Sized> Dispatcher<'a, H, D> {
    pub fn new(region: &'a SharedRegion, hw: &'a H, doorbell: &'a D, core: CoreId) -> Self {
        Self {
            region,
            hw,
            doorbell,
            core,
        }
    }

    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Semaphore registry bound to the same core
    pub fn semaphores(&self) -> Semaphores<'a, H> {
        self.region.semaphores(self.hw, self.core)
    }

    /// Queue `func` with a copy of `arg` and signal the other core
    ///
    /// # Arguments
    /// * `func` - Callback run by whichever core takes the task
    /// * `arg` - Bytes copied into the task record (none if `None`)
    ///
    /// # Returns
    /// Id of the queued task
    ///
    /// # Errors
    /// - `DispatchError::OutOfMemory` if the shared heap cannot hold the record
    /// - `DispatchError::ArgumentTooLarge` if `arg` overflows the length field
    pub fn submit(&self, func: TaskFn, arg: Option<&[u8]>) -> Result<TaskId> {
        let arg = arg.unwrap_or(&[]);
        let too_large = DispatchError::ArgumentTooLarge { len: arg.len() };
        let arg_len = u32::try_from(arg.len()).map_err(|_| too_large)?;
        let requested = TASK_HEADER_SIZE.checked_add(arg.len()).ok_or(too_large)?;

        let id = {
            let mut state = self.region.dispatch.lock(self.hw, self.core);
            let mut record = match state.heap.allocate(requested) {
                Ok(record) => record,
                Err(_) => {
                    log::debug!(
                        "{:?}: shared heap cannot hold a {}-byte task ({} queued)",
                        self.core,
                        requested,
                        state.queue.len()
                    );
                    return Err(DispatchError::OutOfMemory { requested });
                }
            };
            let id = state.take_id();
            record.as_mut_slice()[TASK_HEADER_SIZE..requested].copy_from_slice(arg);

            let task = record.into_raw().cast::<TaskHeader>();
            // SAFETY: the record is fresh, word aligned and large enough for
            // the header; the dispatch lock is held while it is linked
            unsafe {
                task.as_ptr().write(TaskHeader::new(func, id, arg_len));
                state.queue.push(task);
            }
            id
        };

        log::trace!("{:?}: queued {} ({} argument bytes)", self.core, id, arg.len());
        self.doorbell.ring(self.core.peer());
        Ok(id)
    }

    /// Take the oldest pending task, or `None` if the queue is empty
    pub fn next(&self) -> Option<TaskHandle> {
        let mut state = self.region.dispatch.lock(self.hw, self.core);
        // SAFETY: queued records stay allocated until completed
        let task = unsafe { state.queue.pop() }?;

        // SAFETY: detached above; only this core can reach it now
        let header = unsafe { &mut *task.as_ptr() };
        if header.state != STATE_PENDING {
            duet_platform::misuse!(
                "task#{} dequeued in state {:#04x}, expected pending",
                header.id,
                header.state
            );
        }
        header.state = STATE_EXECUTING;

        // SAFETY: detached and marked executing
        Some(unsafe { TaskHandle::from_raw(task) })
    }

    /// Return a finished task's record to the shared heap
    ///
    /// # Panics
    /// Panics if the record is not in the executing state or does not
    /// belong to this region's heap
    pub fn complete(&self, task: TaskHandle) {
        let task = task.into_raw();
        let addr = task.as_ptr() as usize;

        let mut state = self.region.dispatch.lock(self.hw, self.core);
        if !state.heap.contains(addr) {
            duet_platform::misuse!("task record {:#x} is outside the shared heap", addr);
        }

        // SAFETY: inside the heap and owned by the handle we just consumed
        let header = unsafe { &mut *task.as_ptr() };
        if header.state != STATE_EXECUTING {
            duet_platform::misuse!(
                "completing task#{} in state {:#04x}, expected executing",
                header.id,
                header.state
            );
        }
        header.state = STATE_RETIRED;
        state.heap.release_raw(task.cast());
    }

    /// Run every queued task, oldest first
    ///
    /// Tasks submitted while draining are run too.
    ///
    /// # Returns
    /// Number of tasks run
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.next() {
            task.execute();
            self.complete(task);
            ran += 1;
        }
        ran
    }

    /// Number of queued tasks
    pub fn pending(&self) -> usize {
        self.region.dispatch.lock(self.hw, self.core).queue.len()
    }

    /// Usage snapshot of the shared heap
    pub fn heap_stats(&self) -> HeapStats {
        self.region.dispatch.lock(self.hw, self.core).heap.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr::NonNull;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use duet_platform::mock::{MockDoorbell, MockHwSemaphore};
    use std::boxed::Box;

    fn region(pool: usize) -> &'static SharedRegion {
        let len = SharedRegion::required_len(pool);
        let words: &'static mut [u64] = Box::leak(vec![0u64; len.div_ceil(8)].into_boxed_slice());
        let base = NonNull::new(words.as_mut_ptr() as *mut u8).unwrap();
        unsafe { SharedRegion::init(base, len).unwrap() }
    }

    fn noop(_: &[u8]) {}

    #[test]
    fn test_submit_rings_peer() {
        let (hw, bell) = (MockHwSemaphore::new(), MockDoorbell::new());
        let region = region(8192);
        let primary = Dispatcher::new(region, &hw, &bell, CoreId::Primary);

        let id = primary.submit(noop, None).unwrap();
        assert_eq!(id.as_u32(), 0);
        assert_eq!(bell.pending(CoreId::Auxiliary), 1);
        assert_eq!(bell.pending(CoreId::Primary), 0);
        assert_eq!(primary.pending(), 1);
        // Dispatch lock released after submit
        assert!(!hw.is_taken(region.task_queue_id().lock()));
    }

    #[test]
    fn test_next_on_empty_queue() {
        let (hw, bell) = (MockHwSemaphore::new(), MockDoorbell::new());
        let region = region(8192);
        let auxiliary = Dispatcher::new(region, &hw, &bell, CoreId::Auxiliary);
        assert!(auxiliary.next().is_none());
        assert_eq!(auxiliary.run_pending(), 0);
    }

    #[test]
    fn test_argument_is_copied() {
        let (hw, bell) = (MockHwSemaphore::new(), MockDoorbell::new());
        let region = region(8192);
        let primary = Dispatcher::new(region, &hw, &bell, CoreId::Primary);
        let auxiliary = Dispatcher::new(region, &hw, &bell, CoreId::Auxiliary);

        let mut arg = *b"volume=7";
        primary.submit(noop, Some(&arg)).unwrap();
        arg.fill(0);

        let task = auxiliary.next().unwrap();
        assert_eq!(task.arg(), b"volume=7");
        auxiliary.complete(task);
    }

    #[test]
    fn test_complete_returns_memory() {
        let (hw, bell) = (MockHwSemaphore::new(), MockDoorbell::new());
        let region = region(8192);
        let primary = Dispatcher::new(region, &hw, &bell, CoreId::Primary);
        let before = primary.heap_stats();

        for _ in 0..10 {
            primary.submit(noop, Some(&[0u8; 200])).unwrap();
        }
        assert_ne!(primary.heap_stats(), before);
        assert_eq!(primary.run_pending(), 10);
        assert_eq!(primary.pending(), 0);

        let after = primary.heap_stats();
        assert_eq!(after.regular.free_bytes, before.regular.free_bytes);
        assert_eq!(after.tiny.free_bytes, before.tiny.free_bytes);
        region.with_heap(&hw, CoreId::Primary, |heap| heap.verify()).unwrap();
    }

    #[test]
    fn test_exhaustion_is_returned() {
        let (hw, bell) = (MockHwSemaphore::new(), MockDoorbell::new());
        let region = region(8192);
        let primary = Dispatcher::new(region, &hw, &bell, CoreId::Primary);

        let mut queued = 0;
        let err = loop {
            match primary.submit(noop, Some(&[0u8; 1000])) {
                Ok(_) => queued += 1,
                Err(err) => break err,
            }
        };
        assert_eq!(err, DispatchError::OutOfMemory { requested: TASK_HEADER_SIZE + 1000 });
        assert!(queued > 0);
        // Nothing half-queued
        assert_eq!(primary.pending(), queued);
        assert_eq!(bell.pending(CoreId::Auxiliary), queued);
    }

    #[test]
    fn test_run_pending_counts_tasks() {
        static RAN: AtomicUsize = AtomicUsize::new(0);
        fn bump(arg: &[u8]) {
            RAN.fetch_add(arg.len(), Ordering::SeqCst);
        }

        let (hw, bell) = (MockHwSemaphore::new(), MockDoorbell::new());
        let region = region(8192);
        let primary = Dispatcher::new(region, &hw, &bell, CoreId::Primary);
        let auxiliary = Dispatcher::new(region, &hw, &bell, CoreId::Auxiliary);

        primary.submit(bump, Some(&[1])).unwrap();
        primary.submit(bump, Some(&[1, 2])).unwrap();
        primary.submit(bump, None).unwrap();
        assert_eq!(auxiliary.run_pending(), 3);
        assert_eq!(RAN.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_semaphores_share_registry() {
        let (hw, bell) = (MockHwSemaphore::new(), MockDoorbell::new());
        let region = region(8192);
        let primary = Dispatcher::new(region, &hw, &bell, CoreId::Primary);
        let auxiliary = Dispatcher::new(region, &hw, &bell, CoreId::Auxiliary);

        let id = primary.semaphores().acquire_id("gui").unwrap();
        assert_eq!(auxiliary.semaphores().acquire_id("gui").unwrap(), id);
        assert_eq!(auxiliary.semaphores().lookup("task_queue"), Some(region.task_queue_id()));
    }

    #[test]
    #[should_panic(expected = "expected executing")]
    fn test_complete_non_executing_panics() {
        let (hw, bell) = (MockHwSemaphore::new(), MockDoorbell::new());
        let region = region(8192);
        let primary = Dispatcher::new(region, &hw, &bell, CoreId::Primary);
        primary.submit(noop, None).unwrap();

        let header = primary.next().unwrap().into_raw();
        unsafe {
            (*header.as_ptr()).state = STATE_PENDING;
            primary.complete(TaskHandle::from_raw(header));
        }
    }
}

//! Registry and locks driven from two host threads over the mock block

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use duet_hwsem::{HwMutex, SemId, SemaphoreError, SemaphoreTable, Semaphores};
use duet_platform::layout::SEMAPHORE_CAPACITY;
use duet_platform::mock::MockHwSemaphore;
use duet_platform::CoreId;

#[test]
fn test_spin_lock_serializes_cores() {
    static HW: MockHwSemaphore = MockHwSemaphore::new();
    static REGISTRY: HwMutex<SemaphoreTable> = HwMutex::new(SemId::REGISTRY, SemaphoreTable::new());
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    // A registry built with `new` has slot 0 free; claim it the usual way
    let mut guard = REGISTRY.lock(&HW, CoreId::Primary);
    *guard = SemaphoreTable::with_registry();
    drop(guard);

    let workers: Vec<_> = [CoreId::Primary, CoreId::Auxiliary]
        .into_iter()
        .map(|core| {
            thread::spawn(move || {
                let sems = Semaphores::new(&REGISTRY, &HW, core);
                let id = sems.acquire_id("counter").unwrap();
                for _ in 0..5000 {
                    sems.spin_lock(id);
                    // Non-atomic read-modify-write, protected by the hardware lock
                    let value = COUNTER.load(Ordering::Relaxed);
                    COUNTER.store(value + 1, Ordering::Relaxed);
                    sems.unlock(id);
                }
                id
            })
        })
        .collect();

    let ids: Vec<SemId> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(ids[0], ids[1]);
    assert_eq!(COUNTER.load(Ordering::SeqCst), 10_000);
}

#[test]
fn test_registry_fills_and_recovers() {
    let hw = MockHwSemaphore::new();
    let registry = HwMutex::new(SemId::REGISTRY, SemaphoreTable::with_registry());
    let sems = Semaphores::new(&registry, &hw, CoreId::Auxiliary);

    let ids: Vec<SemId> = (1..SEMAPHORE_CAPACITY)
        .map(|n| sems.acquire_id(&format!("sem{n}")).unwrap())
        .collect();
    assert_eq!(
        sems.acquire_id("overflow"),
        Err(SemaphoreError::NoFreeSlot {
            capacity: SEMAPHORE_CAPACITY
        })
    );

    // Existing names still resolve when full
    assert_eq!(sems.acquire_id("sem5"), Ok(ids[4]));

    sems.release_id(ids[10]);
    assert_eq!(sems.acquire_id("overflow"), Ok(ids[10]));
}

use super::mock_test_prelude::*;
use std::sync::Arc;

type Scheme = SemiSpaceScheme<MockRemoteVM>;

#[test]
pub fn missed_reclaiming_halt_uses_remaining_forwarding_words() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    let b = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();
    let ra = fixture.reference(a);
    let rb = fixture.reference(b);

    heap.start_gc(&vm);
    fixture.refresh();
    // The collection evacuates `a` and completes without the reclaiming halt.
    let a2 = heap.evacuate(&vm, a);
    vm.enter_reclaiming();
    vm.finish_gc();
    fixture.refresh();

    assert_eq!(fixture.inspector.phase(), HeapPhase::Mutating);
    assert_eq!(ra.origin(), a2);
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(ra.forwarded_from(), None);
    assert_eq!(rb.status(), ObjectStatus::Dead);
    let scheme = fixture.scheme::<Scheme>();
    assert!(scheme.from_space_refs().is_empty());
    assert_eq!(scheme.to_space_refs().len(), 1);
    fixture.assert_maps_consistent();
}

#[test]
pub fn missed_cycle_drops_every_reference() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();
    let ra = fixture.reference(a);

    let moved = heap.collect(&vm, &[a]);
    fixture.refresh();

    assert_eq!(ra.status(), ObjectStatus::Dead);
    assert_eq!(ra.prior_status(), Some(ObjectStatus::Live));
    assert_eq!(fixture.inspector.stats().total_references(), 0);
    // The heap is still readable from memory.
    assert_eq!(fixture.status(moved[0]), ObjectStatus::Live);
    assert_eq!(fixture.status(a), ObjectStatus::Dead);
    let fresh = fixture.reference(moved[0]);
    assert_eq!(fresh.status(), ObjectStatus::Live);
    fixture.assert_maps_consistent();
}

#[test]
pub fn missed_cycle_followed_by_a_new_collection() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();
    let ra = fixture.reference(a);

    let moved = heap.collect(&vm, &[a]);
    heap.start_gc(&vm);
    fixture.refresh();
    assert_eq!(fixture.inspector.phase(), HeapPhase::Analyzing);
    assert_eq!(ra.status(), ObjectStatus::Dead);
    // The survivor of the missed collection is being evacuated again.
    assert_eq!(fixture.status(moved[0]), ObjectStatus::Unknown);
    let r = fixture.reference(moved[0]);
    let again = heap.evacuate(&vm, moved[0]);
    fixture.refresh();
    assert_eq!(r.origin(), again);
    assert_eq!(r.forwarded_from(), Some(moved[0]));
    fixture.assert_maps_consistent();
}

#[test]
pub fn attach_during_a_collection() {
    let vm = Arc::new(MockRemoteVM::new("SemiSpaceHeapScheme"));
    let mut heap = SemiSpaceHeap::create(&vm);
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    let b = vm.alloc(heap.to, OBJECT_WORDS);
    heap.start_gc(&vm);
    let a2 = heap.evacuate(&vm, a);

    let mut fixture = InspectorFixture::new(vm.clone());
    fixture.initialize();
    assert_eq!(vm.breakpoints(), vec![HeapPhase::Reclaiming]);
    assert_eq!(fixture.inspector.phase(), HeapPhase::Analyzing);

    let forwarder = fixture.reference(a);
    assert_eq!(forwarder.status(), ObjectStatus::Forwarder);
    assert_eq!(forwarder.forwarded_to(), Some(a2));
    let rb = fixture.reference(b);
    assert_eq!(rb.status(), ObjectStatus::Unknown);
    fixture.assert_maps_consistent();

    let b2 = heap.evacuate(&vm, b);
    fixture.refresh();
    assert_eq!(rb.origin(), b2);
    vm.enter_reclaiming();
    fixture.refresh();
    assert_eq!(forwarder.status(), ObjectStatus::Dead);
    vm.finish_gc();
    fixture.refresh();
    assert_eq!(rb.status(), ObjectStatus::Live);
    assert_eq!(rb.forwarded_from(), None);
}

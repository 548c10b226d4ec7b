use super::mock_test_prelude::*;

type Scheme = SemiSpaceScheme<MockRemoteVM>;

#[test]
pub fn objects_live_between_collections() {
    let (mut fixture, heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    let b = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();

    assert_eq!(fixture.inspector.phase(), HeapPhase::Mutating);
    assert_eq!(fixture.status(a), ObjectStatus::Live);
    assert_eq!(fixture.status(b), ObjectStatus::Live);
    // past the allocation mark
    let unallocated = vm.region_mark(heap.to);
    assert_eq!(fixture.status(unallocated), ObjectStatus::Dead);
    // from-space is garbage outside of a collection
    assert_eq!(fixture.status(vm.region_start(heap.from)), ObjectStatus::Dead);

    let r1 = fixture.reference(a);
    let r2 = fixture.reference(a);
    assert_eq!(r1.origin(), a);
    assert_eq!(r2.status(), ObjectStatus::Live);
    assert_eq!(fixture.scheme::<Scheme>().to_space_refs().len(), 1);
    assert!(fixture.inspector.make_reference(unallocated).unwrap().is_none());
    assert!(fixture.inspector.make_quasi_reference(a).unwrap().is_none());

    let info = fixture.inspector.memory_management_info(b);
    assert_eq!(info.status, MemoryStatus::Live);
    assert_eq!(info.region.as_deref(), Some("to-space"));
    assert_eq!(
        fixture.inspector.memory_management_info(unallocated).status,
        MemoryStatus::Free
    );
    fixture.assert_maps_consistent();
}

#[test]
pub fn forwarding_is_tracked_through_a_collection() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    let b = vm.alloc(heap.to, OBJECT_WORDS);
    let garbage = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();
    let ra = fixture.reference(a);
    let rb = fixture.reference(b);
    let rg = fixture.reference(garbage);

    // The collection starts and evacuates `a` before the next halt.
    heap.start_gc(&vm);
    let a2 = heap.evacuate(&vm, a);
    fixture.refresh();
    assert_eq!(fixture.inspector.phase(), HeapPhase::Analyzing);
    assert_eq!(ra.origin(), a2);
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(ra.forwarded_from(), Some(a));
    assert_eq!(fixture.status(a), ObjectStatus::Forwarder);
    assert_eq!(fixture.status(a2), ObjectStatus::Live);
    assert_eq!(fixture.inspector.forwarding_address(a), Some(a2));
    assert_eq!(rb.status(), ObjectStatus::Unknown);
    assert_eq!(fixture.status(b), ObjectStatus::Unknown);
    let forwarder = fixture.inspector.make_quasi_reference(a).unwrap().unwrap();
    assert_eq!(forwarder.forwarded_to(), Some(a2));
    assert_eq!(
        fixture.inspector.memory_management_info(b).status,
        MemoryStatus::Unknown
    );

    // `b` is evacuated at the next halt.
    let b2 = heap.evacuate(&vm, b);
    fixture.refresh();
    assert_eq!(rb.origin(), b2);
    assert_eq!(rb.forwarded_from(), Some(b));
    assert_eq!(fixture.status(b), ObjectStatus::Forwarder);
    fixture.assert_maps_consistent();

    // Reclaiming: from-space is garbage, forwarding is still known to the survivors.
    vm.enter_reclaiming();
    fixture.refresh();
    assert_eq!(fixture.inspector.phase(), HeapPhase::Reclaiming);
    assert_eq!(rg.status(), ObjectStatus::Dead);
    assert_eq!(rg.prior_status(), Some(ObjectStatus::Unknown));
    assert_eq!(forwarder.status(), ObjectStatus::Dead);
    assert_eq!(fixture.status(a), ObjectStatus::Dead);
    assert_eq!(fixture.status(garbage), ObjectStatus::Dead);
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(ra.forwarded_from(), Some(a));
    assert!(fixture.scheme::<Scheme>().from_space_refs().is_empty());
    assert_eq!(
        fixture.inspector.memory_management_info(a).status,
        MemoryStatus::Dead
    );

    // The cycle ends and the forwarding metadata goes away.
    vm.finish_gc();
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(ra.forwarded_from(), None);
    assert_eq!(rb.origin(), b2);
    assert_eq!(fixture.status(a2), ObjectStatus::Live);
    fixture.assert_maps_consistent();
}

#[test]
pub fn objects_allocated_during_analysis() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    fixture.refresh();
    heap.start_gc(&vm);
    let fresh = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();
    let r = fixture.reference(fresh);
    assert_eq!(r.status(), ObjectStatus::Live);
    assert!(r.gc_description().contains("TO_NEW"));

    vm.enter_reclaiming();
    fixture.refresh();
    assert!(r.gc_description().contains("LIVE"));
    vm.finish_gc();
    fixture.refresh();
    assert_eq!(r.status(), ObjectStatus::Live);
    assert_eq!(r.origin(), fresh);
}

#[test]
pub fn reference_follows_its_object_to_the_copy() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();
    let old = fixture.reference(a);

    heap.start_gc(&vm);
    fixture.refresh();
    assert_eq!(old.status(), ObjectStatus::Unknown);
    let a2 = heap.evacuate(&vm, a);
    fixture.refresh();
    let copy = fixture.reference(a2);
    assert_eq!(copy.origin(), old.origin());
    assert_eq!(copy.forwarded_from(), Some(a));
}

#[test]
pub fn forwarder_and_copy_are_linked_in_either_order() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    let b = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();

    heap.start_gc(&vm);
    let a2 = heap.evacuate(&vm, a);
    let b2 = heap.evacuate(&vm, b);
    fixture.refresh();

    // Forwarder first, then the copy.
    let forwarder = fixture.inspector.make_quasi_reference(a).unwrap().unwrap();
    assert_eq!(forwarder.forwarded_to(), Some(a2));
    let copy = fixture.reference(a2);
    assert_eq!(copy.forwarded_from(), Some(a));
    assert!(copy.gc_description().contains("TO_FORWARDED"));

    // Copy first, then the forwarder.
    let copy = fixture.reference(b2);
    assert_eq!(copy.forwarded_from(), None);
    let forwarder = fixture.inspector.make_quasi_reference(b).unwrap().unwrap();
    assert_eq!(forwarder.forwarded_to(), Some(b2));
    assert_eq!(copy.forwarded_from(), Some(b));
    fixture.assert_maps_consistent();

    vm.enter_reclaiming();
    fixture.refresh();
    assert_eq!(forwarder.status(), ObjectStatus::Dead);
    assert_eq!(copy.forwarded_from(), Some(b));
    vm.finish_gc();
    fixture.refresh();
    assert_eq!(copy.status(), ObjectStatus::Live);
    assert_eq!(copy.forwarded_from(), None);
}

#[test]
pub fn refresh_at_the_same_epoch_is_a_no_op() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();
    let r = fixture.reference(a);
    let before = fixture.inspector.stats();

    heap.start_gc(&vm);
    heap.evacuate(&vm, a);
    let epoch = fixture.epoch;
    fixture.inspector.update_memory_status(epoch).unwrap();
    assert_eq!(fixture.inspector.phase(), HeapPhase::Mutating);
    assert_eq!(fixture.inspector.stats(), before);
    assert_eq!(r.status(), ObjectStatus::Live);
    assert_eq!(r.origin(), a);
    assert_eq!(fixture.inspector.last_update_epoch(), Some(epoch));

    fixture.refresh();
    assert_eq!(fixture.inspector.phase(), HeapPhase::Analyzing);
    assert_ne!(r.origin(), a);
}

#[test]
pub fn flip_exchanges_region_identities() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let (first_to, first_from) = (heap.to, heap.from);
    {
        let scheme = fixture.scheme::<Scheme>();
        assert_eq!(scheme.to_space().unwrap().descriptor(), first_to);
        assert_eq!(scheme.from_space().unwrap().descriptor(), first_from);
    }

    heap.start_gc(&vm);
    fixture.refresh();
    let scheme = fixture.scheme::<Scheme>();
    let to = scheme.to_space().unwrap();
    assert_eq!(to.name(), "to-space");
    assert_eq!(to.descriptor(), first_from);
    assert_eq!(to.start(), vm.region_start(first_from));
    assert_eq!(scheme.from_space().unwrap().descriptor(), first_to);
    assert_eq!(fixture.inspector.heap_regions().len(), 2);
}

#[test]
pub fn unreferenced_entries_are_swept() {
    let (mut fixture, heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    let b = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();
    let kept = fixture.reference(a);
    drop(fixture.reference(b));
    assert_eq!(fixture.scheme::<Scheme>().to_space_refs().len(), 2);
    fixture.refresh();
    let refs = fixture.scheme::<Scheme>().to_space_refs();
    assert_eq!(refs.len(), 1);
    assert!(refs.contains(kept.origin()));
}

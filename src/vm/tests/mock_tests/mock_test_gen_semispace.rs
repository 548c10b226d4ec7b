use super::mock_test_prelude::*;
use crate::reference::gen_semispace::CollectionKind;
use std::sync::Arc;

type Scheme = GenSemiSpaceScheme<MockRemoteVM>;

#[test]
pub fn minor_collection_promotes_young_objects() {
    let (mut fixture, mut heap) = gen_semispace_fixture();
    let vm = fixture.vm.clone();
    let old = vm.alloc(heap.old_to, OBJECT_WORDS);
    let y1 = vm.alloc(heap.nursery, OBJECT_WORDS);
    let y2 = vm.alloc(heap.nursery, OBJECT_WORDS);
    let y3 = vm.alloc(heap.nursery, OBJECT_WORDS);
    fixture.refresh();
    let r_old = fixture.reference(old);
    let r1 = fixture.reference(y1);
    let r2 = fixture.reference(y2);
    assert_eq!(r1.status(), ObjectStatus::Live);
    assert_eq!(fixture.scheme::<Scheme>().nursery_refs().len(), 2);

    heap.start_gc(&vm, false);
    let p1 = heap.evacuate(&vm, y1);
    let p3 = heap.evacuate(&vm, y3);
    fixture.refresh();
    {
        let scheme = fixture.scheme::<Scheme>();
        assert_eq!(scheme.collection_kind(), Some(CollectionKind::Minor));
        assert_eq!(scheme.evacuation_mark(), vm.scheme_field(CollectorField::EvacuationMark));
        assert_eq!(scheme.promoted_refs().len(), 1);
    }
    assert_eq!(r1.origin(), p1);
    assert_eq!(r1.forwarded_from(), Some(y1));
    assert_eq!(r2.status(), ObjectStatus::Unknown);
    assert_eq!(r_old.status(), ObjectStatus::Live);
    assert_eq!(fixture.status(y1), ObjectStatus::Forwarder);
    assert_eq!(fixture.status(y3), ObjectStatus::Forwarder);
    assert_eq!(fixture.inspector.forwarding_address(y3), Some(p3));
    // An untracked promoted object is recognized above the evacuation mark.
    let r3 = fixture.reference(p3);
    assert!(r3.gc_description().contains("OLD_PROMOTED_REF"));
    assert_eq!(fixture.scheme::<Scheme>().promoted_refs().len(), 2);
    assert_eq!(
        fixture.inspector.memory_management_info(y2).status,
        MemoryStatus::Unknown
    );
    fixture.assert_maps_consistent();

    vm.enter_reclaiming();
    fixture.refresh();
    assert_eq!(r2.status(), ObjectStatus::Dead);
    assert_eq!(fixture.status(y2), ObjectStatus::Dead);
    assert_eq!(r1.status(), ObjectStatus::Live);
    assert_eq!(r1.forwarded_from(), Some(y1));
    assert!(r3.gc_description().contains("OLD_REF_LIVE"));
    {
        let scheme = fixture.scheme::<Scheme>();
        assert!(scheme.promoted_refs().is_empty());
        assert!(scheme.nursery_refs().is_empty());
        assert_eq!(scheme.old_to_refs().len(), 3);
    }

    heap.finish_gc(&vm);
    fixture.refresh();
    assert_eq!(r1.forwarded_from(), None);
    assert!(r1.gc_description().contains("OLD_REF_LIVE"));
    assert_eq!(fixture.scheme::<Scheme>().collection_kind(), None);
    assert_eq!(fixture.status(p1), ObjectStatus::Live);
    assert_eq!(fixture.status(y1), ObjectStatus::Dead);
    fixture.assert_maps_consistent();
}

#[test]
pub fn full_collection_evacuates_the_old_generation() {
    let (mut fixture, mut heap) = gen_semispace_fixture();
    let vm = fixture.vm.clone();
    let o1 = vm.alloc(heap.old_to, OBJECT_WORDS);
    let o2 = vm.alloc(heap.old_to, OBJECT_WORDS);
    let y1 = vm.alloc(heap.nursery, OBJECT_WORDS);
    fixture.refresh();
    let r_o1 = fixture.reference(o1);
    let r_y1 = fixture.reference(y1);
    let first_old_to = heap.old_to;

    heap.start_gc(&vm, true);
    let o1n = heap.evacuate(&vm, o1);
    let y1n = heap.evacuate(&vm, y1);
    fixture.refresh();
    {
        let scheme = fixture.scheme::<Scheme>();
        assert_eq!(scheme.collection_kind(), Some(CollectionKind::Full));
        assert_eq!(scheme.old_from_space().unwrap().descriptor(), first_old_to);
        assert_eq!(scheme.old_to_space().unwrap().name(), "old to-space");
    }
    assert_eq!(r_o1.origin(), o1n);
    assert_eq!(r_o1.forwarded_from(), Some(o1));
    assert_eq!(r_y1.origin(), y1n);
    assert_eq!(fixture.status(o1), ObjectStatus::Forwarder);
    assert_eq!(fixture.inspector.forwarding_address(o1), Some(o1n));
    assert_eq!(fixture.status(o2), ObjectStatus::Unknown);
    let r_o2 = fixture.reference(o2);
    assert_eq!(r_o2.status(), ObjectStatus::Unknown);
    assert_eq!(
        fixture.inspector.memory_management_info(o2).status,
        MemoryStatus::Unknown
    );
    fixture.assert_maps_consistent();

    vm.enter_reclaiming();
    fixture.refresh();
    assert_eq!(r_o2.status(), ObjectStatus::Dead);
    assert_eq!(fixture.status(o1), ObjectStatus::Dead);
    assert_eq!(
        fixture.inspector.memory_management_info(o2).status,
        MemoryStatus::Dead
    );
    assert!(fixture.scheme::<Scheme>().old_from_refs().is_empty());

    heap.finish_gc(&vm);
    fixture.refresh();
    for r in [&r_o1, &r_y1] {
        assert_eq!(r.status(), ObjectStatus::Live);
        assert_eq!(r.forwarded_from(), None);
        assert!(r.gc_description().contains("OLD_REF_LIVE"));
    }

    // The next collection is minor again.
    heap.start_gc(&vm, false);
    fixture.refresh();
    assert_eq!(
        fixture.scheme::<Scheme>().collection_kind(),
        Some(CollectionKind::Minor)
    );
    assert_eq!(r_o1.status(), ObjectStatus::Live);
}

#[test]
pub fn missed_minor_cycle_keeps_the_old_generation() {
    let (mut fixture, mut heap) = gen_semispace_fixture();
    let vm = fixture.vm.clone();
    let old = vm.alloc(heap.old_to, OBJECT_WORDS);
    let young = vm.alloc(heap.nursery, OBJECT_WORDS);
    fixture.refresh();
    let r_old = fixture.reference(old);
    let r_young = fixture.reference(young);

    heap.start_gc(&vm, false);
    let promoted = heap.evacuate(&vm, young);
    vm.enter_reclaiming();
    heap.finish_gc(&vm);
    fixture.refresh();

    assert_eq!(r_young.status(), ObjectStatus::Dead);
    assert_eq!(r_old.status(), ObjectStatus::Live);
    assert_eq!(fixture.status(promoted), ObjectStatus::Live);
    assert_eq!(fixture.status(young), ObjectStatus::Dead);
}

#[test]
pub fn missed_full_cycle_drops_everything() {
    let (mut fixture, mut heap) = gen_semispace_fixture();
    let vm = fixture.vm.clone();
    let old = vm.alloc(heap.old_to, OBJECT_WORDS);
    fixture.refresh();
    let r_old = fixture.reference(old);

    heap.start_gc(&vm, true);
    let moved = heap.evacuate(&vm, old);
    vm.enter_reclaiming();
    heap.finish_gc(&vm);
    fixture.refresh();

    assert_eq!(r_old.status(), ObjectStatus::Dead);
    assert_eq!(fixture.inspector.stats().total_references(), 0);
    assert_eq!(fixture.status(moved), ObjectStatus::Live);
}

#[test]
pub fn attach_during_a_minor_collection_after_a_full_one() {
    let vm = Arc::new(MockRemoteVM::new("GenSSHeapScheme"));
    let mut heap = GenSemiSpaceHeap::create(&vm);
    let stale = vm.alloc(heap.old_to, OBJECT_WORDS);
    heap.start_gc(&vm, true);
    let survivor = heap.evacuate(&vm, stale);
    vm.enter_reclaiming();
    heap.finish_gc(&vm);
    let old = vm.alloc(heap.old_to, OBJECT_WORDS);
    let young = vm.alloc(heap.nursery, OBJECT_WORDS);
    heap.start_gc(&vm, false);
    let promoted = heap.evacuate(&vm, young);

    let mut fixture = InspectorFixture::new(vm.clone());
    fixture.initialize();
    assert_eq!(fixture.inspector.phase(), HeapPhase::Analyzing);
    assert_eq!(
        fixture.scheme::<Scheme>().collection_kind(),
        Some(CollectionKind::Minor)
    );
    // The forwarding word left in old from-space by the full collection is not trusted.
    assert_eq!(fixture.status(stale), ObjectStatus::Dead);
    assert_eq!(fixture.inspector.forwarding_address(stale), None);
    assert!(fixture.inspector.make_quasi_reference(stale).unwrap().is_none());
    assert_eq!(fixture.status(survivor), ObjectStatus::Live);
    assert_eq!(fixture.status(young), ObjectStatus::Forwarder);
    let r_old = fixture.reference(old);
    let r_promoted = fixture.reference(promoted);
    assert!(r_promoted.gc_description().contains("OLD_PROMOTED_REF"));
    fixture.assert_maps_consistent();

    vm.enter_reclaiming();
    fixture.refresh();
    heap.finish_gc(&vm);
    fixture.refresh();
    assert_eq!(r_old.status(), ObjectStatus::Live);
    assert_eq!(r_promoted.status(), ObjectStatus::Live);
    assert_eq!(fixture.status(stale), ObjectStatus::Dead);
    fixture.assert_maps_consistent();
}

#[test]
pub fn promoted_copy_learns_its_nursery_origin() {
    let (mut fixture, mut heap) = gen_semispace_fixture();
    let vm = fixture.vm.clone();
    let young = vm.alloc(heap.nursery, OBJECT_WORDS);
    fixture.refresh();

    heap.start_gc(&vm, false);
    let promoted = heap.evacuate(&vm, young);
    fixture.refresh();
    let forwarder = fixture.inspector.make_quasi_reference(young).unwrap().unwrap();
    assert_eq!(forwarder.forwarded_to(), Some(promoted));
    let copy = fixture.reference(promoted);
    assert_eq!(copy.forwarded_from(), Some(young));
    assert!(copy.gc_description().ends_with("state=PROMOTED_REF"));
    fixture.assert_maps_consistent();

    vm.enter_reclaiming();
    fixture.refresh();
    heap.finish_gc(&vm);
    fixture.refresh();
    assert_eq!(forwarder.status(), ObjectStatus::Dead);
    assert_eq!(copy.status(), ObjectStatus::Live);
    assert_eq!(copy.forwarded_from(), None);
}

use super::mock_test_prelude::*;

type Scheme = MarkSweepScheme<MockRemoteVM>;

#[test]
pub fn unmarked_objects_are_swept() {
    let (mut fixture, space) = marksweep_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(space, OBJECT_WORDS);
    let b = vm.alloc(space, OBJECT_WORDS);
    let c = vm.alloc(space, OBJECT_WORDS);
    fixture.refresh();
    assert_eq!(fixture.inspector.get_scheme().name(), "MarkSweep");
    let ra = fixture.reference(a);
    let rb = fixture.reference(b);
    assert_eq!(ra.status(), ObjectStatus::Live);

    vm.start_gc(false);
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Unknown);
    assert_eq!(rb.status(), ObjectStatus::Unknown);
    assert_eq!(fixture.status(c), ObjectStatus::Unknown);
    assert_eq!(
        fixture.inspector.memory_management_info(c).status,
        MemoryStatus::Unknown
    );

    vm.mark(a);
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(rb.status(), ObjectStatus::Unknown);
    fixture.assert_maps_consistent();

    vm.enter_reclaiming();
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(rb.status(), ObjectStatus::Dead);
    assert_eq!(rb.prior_status(), Some(ObjectStatus::Unknown));
    assert_eq!(fixture.status(c), ObjectStatus::Dead);
    assert_eq!(fixture.scheme::<Scheme>().object_refs().len(), 1);

    // The sweeper turns the garbage into a free chunk.
    vm.make_free_chunk(b);
    vm.clear_marks();
    vm.finish_gc();
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(fixture.status(a), ObjectStatus::Live);
    assert_eq!(fixture.status(b), ObjectStatus::Free);
    fixture.assert_maps_consistent();
}

#[test]
pub fn free_chunks_are_tracked_until_consumed() {
    let (mut fixture, space) = marksweep_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(space, OBJECT_WORDS);
    let chunk = vm.alloc(space, OBJECT_WORDS);
    vm.make_free_chunk(chunk);
    fixture.refresh();

    assert_eq!(fixture.status(chunk), ObjectStatus::Free);
    assert!(fixture.inspector.make_reference(chunk).unwrap().is_none());
    assert!(fixture.inspector.make_quasi_reference(a).unwrap().is_none());
    let free = fixture.inspector.make_quasi_reference(chunk).unwrap().unwrap();
    assert_eq!(free.status(), ObjectStatus::Free);
    let info = fixture.inspector.memory_management_info(chunk);
    assert_eq!(info.status, MemoryStatus::Free);
    assert_eq!(info.terse, "chunk");

    // A collection leaves free chunks alone.
    vm.start_gc(false);
    fixture.refresh();
    assert_eq!(free.status(), ObjectStatus::Free);
    vm.enter_reclaiming();
    fixture.refresh();
    vm.finish_gc();
    fixture.refresh();
    assert_eq!(free.status(), ObjectStatus::Free);
    assert_eq!(fixture.scheme::<Scheme>().free_chunk_refs().len(), 1);

    // The allocator reuses the chunk.
    vm.place_object(chunk);
    fixture.refresh();
    assert_eq!(free.status(), ObjectStatus::Dead);
    assert!(fixture.scheme::<Scheme>().free_chunk_refs().is_empty());
    assert_eq!(fixture.status(chunk), ObjectStatus::Live);
}

#[test]
pub fn unavailable_mark_bits_count_as_marked() {
    let (mut fixture, space) = marksweep_fixture();
    let vm = fixture.vm.clone();
    vm.set_marks_available(false);
    let a = vm.alloc(space, OBJECT_WORDS);
    let b = vm.alloc(space, OBJECT_WORDS);
    fixture.refresh();
    let ra = fixture.reference(a);
    let rb = fixture.reference(b);

    vm.start_gc(false);
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Unknown);
    assert_eq!(fixture.status(b), ObjectStatus::Unknown);

    vm.enter_reclaiming();
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(rb.status(), ObjectStatus::Live);

    // What was really garbage is found when the cycle ends.
    vm.clobber(b);
    vm.finish_gc();
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(rb.status(), ObjectStatus::Dead);
    assert_eq!(fixture.scheme::<Scheme>().object_refs().len(), 1);
}

#[test]
pub fn unreadable_mark_bits_do_not_interrupt_an_update() {
    let (mut fixture, space) = marksweep_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(space, OBJECT_WORDS);
    let b = vm.alloc(space, OBJECT_WORDS);
    fixture.refresh();
    let ra = fixture.reference(a);
    let rb = fixture.reference(b);

    vm.set_marks_unreadable(true);
    vm.start_gc(false);
    vm.mark(a);
    fixture.refresh();
    assert_eq!(fixture.inspector.last_update_epoch(), Some(fixture.epoch));
    assert_eq!(ra.status(), ObjectStatus::Unknown);
    assert_eq!(rb.status(), ObjectStatus::Unknown);

    vm.set_marks_unreadable(false);
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(rb.status(), ObjectStatus::Unknown);

    vm.set_marks_unreadable(true);
    vm.enter_reclaiming();
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(rb.status(), ObjectStatus::Live);
    assert!(!vm.is_locked());

    vm.set_marks_unreadable(false);
    vm.clobber(b);
    vm.finish_gc();
    fixture.refresh();
    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(rb.status(), ObjectStatus::Dead);
    fixture.assert_maps_consistent();
}

#[test]
pub fn missed_reclaiming_halt_keeps_objects_still_present() {
    let (mut fixture, space) = marksweep_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(space, OBJECT_WORDS);
    let b = vm.alloc(space, OBJECT_WORDS);
    fixture.refresh();
    let ra = fixture.reference(a);
    let rb = fixture.reference(b);

    vm.start_gc(false);
    fixture.refresh();
    vm.mark(a);
    vm.enter_reclaiming();
    vm.make_free_chunk(b);
    vm.clear_marks();
    vm.finish_gc();
    fixture.refresh();

    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(rb.status(), ObjectStatus::Dead);
    assert_eq!(fixture.status(b), ObjectStatus::Free);
    fixture.assert_maps_consistent();
}

#[test]
pub fn missed_cycle_revalidates_objects() {
    let (mut fixture, space) = marksweep_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(space, OBJECT_WORDS);
    let b = vm.alloc(space, OBJECT_WORDS);
    fixture.refresh();
    let ra = fixture.reference(a);
    let rb = fixture.reference(b);

    vm.start_gc(false);
    vm.enter_reclaiming();
    vm.clobber(b);
    vm.finish_gc();
    fixture.refresh();

    assert_eq!(ra.status(), ObjectStatus::Live);
    assert_eq!(rb.status(), ObjectStatus::Dead);
}

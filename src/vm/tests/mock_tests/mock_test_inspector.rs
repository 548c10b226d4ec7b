use super::mock_test_prelude::*;
use crate::util::options::{HeapSchemeSelector, Options};
use std::sync::Arc;

#[test]
pub fn initialize_installs_the_reclaiming_breakpoint_once() {
    let (mut fixture, _heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    assert!(fixture.inspector.is_initialized());
    assert_eq!(fixture.inspector.last_update_epoch(), Some(1));
    assert_eq!(vm.breakpoints(), vec![HeapPhase::Reclaiming]);
    assert_eq!(
        fixture.inspector.get_scheme().selector(),
        HeapSchemeSelector::SemiSpace
    );

    fixture.initialize();
    assert_eq!(vm.breakpoints(), vec![HeapPhase::Reclaiming]);
    assert_eq!(fixture.inspector.last_update_epoch(), Some(1));
    assert!(!vm.is_locked());
}

#[test]
pub fn initialize_can_be_retried_when_breakpoints_are_busy() {
    let vm = Arc::new(MockRemoteVM::new("MSHeapScheme"));
    let space = vm.add_region(REGION_SIZE);
    vm.set_scheme_field(CollectorField::MarkSweepSpace, space);
    vm.set_breakpoint_busy(true);
    let mut fixture = InspectorFixture::new(vm.clone());

    assert_eq!(fixture.inspector.initialize(1), Err(TeleError::Busy));
    assert!(!fixture.inspector.is_initialized());
    assert_eq!(fixture.inspector.last_update_epoch(), Some(1));
    assert!(vm.breakpoints().is_empty());

    vm.set_breakpoint_busy(false);
    fixture.inspector.initialize(2).unwrap();
    assert!(fixture.inspector.is_initialized());
    assert_eq!(vm.breakpoints(), vec![HeapPhase::Reclaiming]);
}

#[test]
pub fn busy_target_changes_nothing() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();
    let r = fixture.reference(a);
    let locks = vm.lock_count();

    heap.start_gc(&vm);
    heap.evacuate(&vm, a);
    vm.set_busy(true);
    let err = fixture.inspector.update_memory_status(fixture.epoch + 1).unwrap_err();
    assert_eq!(err, TeleError::Busy);
    assert!(!err.is_fatal());
    assert_eq!(fixture.inspector.phase(), HeapPhase::Mutating);
    assert_eq!(fixture.inspector.last_update_epoch(), Some(fixture.epoch));
    assert_eq!(r.origin(), a);
    assert_eq!(vm.lock_count(), locks);

    vm.set_busy(false);
    fixture.refresh();
    assert_eq!(fixture.inspector.phase(), HeapPhase::Analyzing);
    assert_ne!(r.origin(), a);
    assert_eq!(vm.lock_count(), locks + 1);
    assert!(!vm.is_locked());
}

#[test]
pub fn unknown_collector_falls_back_to_an_empty_model() {
    let vm = Arc::new(MockRemoteVM::new("G1HeapScheme"));
    let region = vm.add_region(REGION_SIZE);
    let object = vm.alloc(region, OBJECT_WORDS);
    let mut fixture = InspectorFixture::new(vm.clone());
    fixture.initialize();

    assert_eq!(fixture.inspector.get_scheme().name(), "Unknown");
    assert!(vm.breakpoints().is_empty());
    assert!(fixture.inspector.heap_regions().is_empty());
    assert!(fixture.inspector.region_table().is_none());
    assert_eq!(fixture.status(object), ObjectStatus::Dead);
    assert!(fixture.inspector.make_reference(object).unwrap().is_none());
    assert!(fixture.inspector.make_quasi_reference(object).unwrap().is_none());
    assert_eq!(fixture.inspector.forwarding_address(object), None);
    assert_eq!(
        fixture.inspector.memory_management_info(object).status,
        MemoryStatus::Unknown
    );
    fixture.refresh();
    assert_eq!(fixture.inspector.last_update_epoch(), Some(2));
    assert_eq!(fixture.inspector.stats().total_references(), 0);
}

#[test]
pub fn heap_scheme_can_be_forced() {
    let vm = Arc::new(MockRemoteVM::new("CustomHeapScheme"));
    let space = vm.add_region(REGION_SIZE);
    vm.set_scheme_field(CollectorField::MarkSweepSpace, space);
    let object = vm.alloc(space, OBJECT_WORDS);
    let options = Options {
        heap_scheme: HeapSchemeSelector::MarkSweep,
        ..Options::new_without_env()
    };
    let mut fixture = InspectorFixture::with_options(vm, options);
    fixture.initialize();
    assert_eq!(fixture.inspector.get_scheme().name(), "MarkSweep");
    assert_eq!(fixture.status(object), ObjectStatus::Live);
}

#[test]
pub fn heap_not_discoverable_yet() {
    let vm = Arc::new(MockRemoteVM::unstarted("SemiSpaceHeapScheme"));
    let heap = SemiSpaceHeap::create(&vm);
    let object = vm.alloc(heap.to, OBJECT_WORDS);
    let mut fixture = InspectorFixture::new(vm.clone());
    fixture.initialize();
    assert!(fixture.inspector.is_initialized());
    assert_eq!(fixture.inspector.last_update_epoch(), None);
    assert!(fixture.inspector.heap_regions().is_empty());
    assert_eq!(fixture.status(object), ObjectStatus::Dead);

    // The scheme object exists, but its class does not describe the spaces yet.
    vm.start();
    vm.hide_field(CollectorField::ToSpace);
    fixture.refresh();
    assert_eq!(fixture.inspector.last_update_epoch(), None);
    assert!(fixture.inspector.heap_regions().is_empty());

    vm.reveal_field(CollectorField::ToSpace);
    fixture.refresh();
    assert_eq!(fixture.inspector.last_update_epoch(), Some(fixture.epoch));
    assert_eq!(fixture.inspector.heap_regions().len(), 2);
    assert_eq!(fixture.status(object), ObjectStatus::Live);
}

#[test]
pub fn counters_going_backwards_are_fatal() {
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    heap.collect(&vm, &[]);
    fixture.refresh();
    assert_eq!(vm.gc_completed(), 1);

    for field in [CollectorField::GcStartedCount, CollectorField::GcCompletedCount] {
        let offset = vm.field_offset(field).unwrap();
        vm.write_word_at(SCHEME_OBJECT + offset, 0);
    }
    fixture.epoch += 1;
    let err = fixture
        .inspector
        .update_memory_status(fixture.epoch)
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(!vm.is_locked());
}

#[test]
pub fn stats_report() {
    let (mut fixture, heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let a = vm.alloc(heap.to, OBJECT_WORDS);
    fixture.refresh();
    let _r = fixture.reference(a);

    let stats = fixture.inspector.stats();
    assert_eq!(stats.scheme, "SemiSpace");
    assert_eq!(stats.last_update_epoch, Some(fixture.epoch));
    assert_eq!(stats.count(ObjectStatus::Live), 1);
    assert_eq!(stats.regions.len(), 2);
    assert_eq!(stats.regions[0].used, OBJECT_WORDS * crate::util::constants::BYTES_IN_WORD);
    let report = stats.to_string();
    assert!(report.starts_with("SemiSpace heap, phase Mutating"));
    assert!(report.contains("to-space refs: 1 [LIVE=1]"));
    assert!(report.contains("from-space refs: 0 []"));
}

use super::mock_test_prelude::*;

type Scheme = MarkSweepScheme<MockRemoteVM>;

#[test]
pub fn region_table_grows_between_epochs() {
    let (mut fixture, mut regions) = region_marksweep_fixture(1);
    let vm = fixture.vm.clone();
    assert_eq!(fixture.inspector.get_scheme().name(), "RegionMarkSweep");
    assert_eq!(fixture.inspector.region_table().unwrap().len(), 1);
    let a = vm.alloc(regions[0], OBJECT_WORDS);
    fixture.refresh();
    let ra = fixture.reference(a);

    regions.push(vm.add_region(REGION_SIZE));
    vm.set_region_table(&regions);
    let b = vm.alloc(regions[1], OBJECT_WORDS);
    // Not known until the next halt.
    assert_eq!(fixture.status(b), ObjectStatus::Dead);
    fixture.refresh();

    let table = fixture.inspector.region_table().unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.region(1).unwrap().descriptor(), regions[1]);
    assert_eq!(table.region(0).unwrap().name(), "region-0");
    assert_eq!(fixture.inspector.heap_regions().len(), 2);
    assert_eq!(fixture.status(b), ObjectStatus::Live);
    assert_eq!(ra.status(), ObjectStatus::Live);
    let info = fixture.inspector.memory_management_info(b);
    assert_eq!(info.region.as_deref(), Some("region-1"));
    assert_eq!(fixture.inspector.stats().regions.len(), 2);
    fixture.assert_maps_consistent();
}

#[test]
pub fn collection_spans_every_region() {
    let (mut fixture, regions) = region_marksweep_fixture(3);
    let vm = fixture.vm.clone();
    let objects: Vec<Address> = regions
        .iter()
        .map(|d| vm.alloc(*d, OBJECT_WORDS))
        .collect();
    fixture.refresh();
    let refs: Vec<_> = objects.iter().map(|o| fixture.reference(*o)).collect();

    vm.start_gc(false);
    fixture.refresh();
    assert!(refs.iter().all(|r| r.status() == ObjectStatus::Unknown));
    vm.mark(objects[0]);
    vm.mark(objects[2]);
    vm.enter_reclaiming();
    fixture.refresh();
    let statuses: Vec<_> = refs.iter().map(|r| r.status()).collect();
    assert_eq!(
        statuses,
        vec![ObjectStatus::Live, ObjectStatus::Dead, ObjectStatus::Live]
    );
    vm.clear_marks();
    vm.finish_gc();
    fixture.refresh();
    assert_eq!(fixture.scheme::<Scheme>().object_refs().len(), 2);
    fixture.assert_maps_consistent();
}

#[test]
pub fn shrinking_table_is_inconsistent() {
    let (mut fixture, regions) = region_marksweep_fixture(2);
    fixture.vm.set_region_table(&regions[..1]);
    fixture.epoch += 1;
    let err = fixture
        .inspector
        .update_memory_status(fixture.epoch)
        .unwrap_err();
    assert!(err.is_fatal());
    // Nothing was committed.
    assert_eq!(fixture.inspector.region_table().unwrap().len(), 2);
    assert_eq!(fixture.inspector.last_update_epoch(), Some(1));
}

// Not every scenario uses every helper.
#![allow(dead_code)]

use super::mock_vm::MockRemoteVM;
use crate::inspector::HeapInspector;
use crate::reference::{ObjectStatus, RemoteRef, RemoteReference};
use crate::scheme::{Epoch, HeapPhase, RemoteHeapScheme};
use crate::util::options::Options;
use crate::util::Address;
use crate::vm::CollectorField;
use std::collections::HashMap;
use std::sync::Arc;

/// Size of every region the fixtures create.
pub const REGION_SIZE: usize = 0x1_0000;
/// Size of the objects the scenarios allocate, in words.
pub const OBJECT_WORDS: usize = 4;

/// An inspector attached to a mock target, with an epoch counter standing in for the
/// debugger's halts.
pub struct InspectorFixture {
    pub vm: Arc<MockRemoteVM>,
    pub inspector: HeapInspector<MockRemoteVM>,
    pub epoch: Epoch,
}

impl InspectorFixture {
    pub fn new(vm: Arc<MockRemoteVM>) -> Self {
        Self::with_options(vm, Options::new_without_env())
    }

    pub fn with_options(vm: Arc<MockRemoteVM>, options: Options) -> Self {
        InspectorFixture {
            inspector: HeapInspector::new(vm.clone(), options),
            vm,
            epoch: 0,
        }
    }

    /// Initialize the inspector at the next epoch.
    pub fn initialize(&mut self) {
        self.epoch += 1;
        self.inspector.initialize(self.epoch).unwrap();
    }

    /// A halt of the target: refresh at the next epoch.
    pub fn refresh(&mut self) {
        self.epoch += 1;
        self.inspector.update_memory_status(self.epoch).unwrap();
    }

    pub fn scheme<T: RemoteHeapScheme>(&self) -> &T {
        self.inspector.downcast_scheme::<T>().unwrap()
    }

    pub fn status(&self, origin: Address) -> ObjectStatus {
        self.inspector.object_status_at(origin)
    }

    /// A reference to the ordinary object at `origin`, which must exist.
    pub fn reference(&mut self, origin: Address) -> RemoteRef {
        self.inspector.make_reference(origin).unwrap().unwrap()
    }

    /// No map holds a dead reference, and no origin is tracked twice. Every entry is keyed by
    /// its reference's origin. Forwarders exist only while the collector analyzes, and a
    /// tracked copy knows the forwarder that points at it.
    pub fn assert_maps_consistent(&self) {
        let stats = self.inspector.stats();
        assert_eq!(stats.count(ObjectStatus::Dead), 0, "{}", stats);
        let tracked = self.inspector.get_scheme().tracked_references();
        assert_eq!(tracked.len(), stats.total_references(), "{}", stats);

        let mut owners = HashMap::new();
        for (map, origin, reference) in &tracked {
            assert_eq!(
                reference.origin(),
                *origin,
                "{} keyed in the {} map",
                reference.origin(),
                map
            );
            if let Some(other) = owners.insert(*origin, *map) {
                panic!("{} is tracked in both the {} and {} maps", origin, other, map);
            }
        }

        let analyzing = self.inspector.phase() == HeapPhase::Analyzing;
        for (map, origin, reference) in &tracked {
            let Some(to) = reference.forwarded_to() else {
                continue;
            };
            assert!(analyzing, "forwarder {} left in the {} map", origin, map);
            if let Some((_, _, copy)) = tracked.iter().find(|(_, o, _)| *o == to) {
                assert_eq!(
                    copy.forwarded_from(),
                    Some(*origin),
                    "copy of {} at {}",
                    origin,
                    to
                );
            }
        }
    }
}

/// Descriptors of the two semispaces, tracking the flips of the mock collector.
pub struct SemiSpaceHeap {
    pub to: Address,
    pub from: Address,
}

impl SemiSpaceHeap {
    pub fn create(vm: &MockRemoteVM) -> Self {
        let heap = SemiSpaceHeap {
            to: vm.add_region(REGION_SIZE),
            from: vm.add_region(REGION_SIZE),
        };
        vm.set_scheme_field(CollectorField::ToSpace, heap.to);
        vm.set_scheme_field(CollectorField::FromSpace, heap.from);
        heap
    }

    /// Start a collection: flip the spaces and empty the new to-space.
    pub fn start_gc(&mut self, vm: &MockRemoteVM) {
        vm.start_gc(false);
        vm.flip(CollectorField::ToSpace, CollectorField::FromSpace);
        std::mem::swap(&mut self.to, &mut self.from);
        vm.reset_region(self.to);
    }

    /// Evacuate the object at `from` into to-space.
    pub fn evacuate(&self, vm: &MockRemoteVM, from: Address) -> Address {
        vm.forward(from, self.to, OBJECT_WORDS)
    }

    /// Run a whole collection between two halts, evacuating `survivors`. Returns their new
    /// origins.
    pub fn collect(&mut self, vm: &MockRemoteVM, survivors: &[Address]) -> Vec<Address> {
        self.start_gc(vm);
        let moved = survivors.iter().map(|a| self.evacuate(vm, *a)).collect();
        vm.enter_reclaiming();
        vm.finish_gc();
        moved
    }
}

pub fn semispace_fixture() -> (InspectorFixture, SemiSpaceHeap) {
    let vm = Arc::new(MockRemoteVM::new("SemiSpaceHeapScheme"));
    let heap = SemiSpaceHeap::create(&vm);
    let mut fixture = InspectorFixture::new(vm);
    fixture.initialize();
    (fixture, heap)
}

/// Descriptors of a generational semispace heap.
pub struct GenSemiSpaceHeap {
    pub nursery: Address,
    pub old_to: Address,
    pub old_from: Address,
}

impl GenSemiSpaceHeap {
    pub fn create(vm: &MockRemoteVM) -> Self {
        let heap = GenSemiSpaceHeap {
            nursery: vm.add_region(REGION_SIZE),
            old_to: vm.add_region(REGION_SIZE),
            old_from: vm.add_region(REGION_SIZE),
        };
        vm.set_scheme_field(CollectorField::YoungSpace, heap.nursery);
        vm.set_scheme_field(CollectorField::OldToSpace, heap.old_to);
        vm.set_scheme_field(CollectorField::OldFromSpace, heap.old_from);
        vm.set_scheme_field(CollectorField::EvacuationMark, vm.region_mark(heap.old_to));
        heap
    }

    /// Start a collection. A full collection also flips the old generation. The evacuation
    /// mark is set to the end of the objects already in old to-space.
    pub fn start_gc(&mut self, vm: &MockRemoteVM, full: bool) {
        vm.start_gc(full);
        if full {
            vm.flip(CollectorField::OldToSpace, CollectorField::OldFromSpace);
            std::mem::swap(&mut self.old_to, &mut self.old_from);
            vm.reset_region(self.old_to);
        }
        vm.set_scheme_field(CollectorField::EvacuationMark, vm.region_mark(self.old_to));
    }

    pub fn evacuate(&self, vm: &MockRemoteVM, from: Address) -> Address {
        vm.forward(from, self.old_to, OBJECT_WORDS)
    }

    /// Complete the collection; the nursery is emptied.
    pub fn finish_gc(&self, vm: &MockRemoteVM) {
        vm.finish_gc();
        vm.reset_region(self.nursery);
    }
}

pub fn gen_semispace_fixture() -> (InspectorFixture, GenSemiSpaceHeap) {
    let vm = Arc::new(MockRemoteVM::new("GenSSHeapScheme"));
    let heap = GenSemiSpaceHeap::create(&vm);
    let mut fixture = InspectorFixture::new(vm);
    fixture.initialize();
    (fixture, heap)
}

/// A contiguous mark-sweep heap: the descriptor of its only space.
pub fn marksweep_fixture() -> (InspectorFixture, Address) {
    let vm = Arc::new(MockRemoteVM::new("MSHeapScheme"));
    let space = vm.add_region(REGION_SIZE);
    vm.set_scheme_field(CollectorField::MarkSweepSpace, space);
    let mut fixture = InspectorFixture::new(vm);
    fixture.initialize();
    (fixture, space)
}

/// A region-table mark-sweep heap with `regions` regions: their descriptors.
pub fn region_marksweep_fixture(regions: usize) -> (InspectorFixture, Vec<Address>) {
    let vm = Arc::new(MockRemoteVM::new("MSEHeapScheme"));
    let descriptors: Vec<Address> = (0..regions).map(|_| vm.add_region(REGION_SIZE)).collect();
    vm.set_region_table(&descriptors);
    let mut fixture = InspectorFixture::new(vm);
    fixture.initialize();
    (fixture, descriptors)
}

/// Descriptors of a generational mark-sweep heap.
pub struct GenMarkSweepHeap {
    pub nursery: Address,
    pub old: Vec<Address>,
}

impl GenMarkSweepHeap {
    /// A nursery and an old generation of two regions.
    pub fn create(vm: &MockRemoteVM) -> Self {
        let heap = GenMarkSweepHeap {
            nursery: vm.add_region(REGION_SIZE),
            old: vec![vm.add_region(REGION_SIZE), vm.add_region(REGION_SIZE)],
        };
        vm.set_scheme_field(CollectorField::YoungSpace, heap.nursery);
        vm.set_region_table(&heap.old);
        heap
    }
}

pub fn gen_marksweep_fixture() -> (InspectorFixture, GenMarkSweepHeap) {
    let vm = Arc::new(MockRemoteVM::new("GenMSEHeapScheme"));
    let heap = GenMarkSweepHeap::create(&vm);
    let mut fixture = InspectorFixture::new(vm);
    fixture.initialize();
    (fixture, heap)
}

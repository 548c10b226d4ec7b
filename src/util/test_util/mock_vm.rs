//! A simulated target VM.
//!
//! The mock owns a sparse byte-addressed memory with a boot image and any number of heap
//! regions. The boot image holds the hub of hubs, an ordinary class hub, the free-chunk hub, the
//! heap scheme object and the region descriptors. Tests drive the simulated collector through
//! the helper methods (allocate, forward, flip, mark, change phase) and then refresh the
//! inspector, exactly as a debugger would at each halt.

use crate::scheme::HeapPhase;
use crate::util::constants::BYTES_IN_WORD;
use crate::util::error::{Result, TeleError};
use crate::util::{Address, Word};
use crate::vm::{CollectorField, CollectorInspection, ProcessControl, RemoteMemory};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::{Mutex, MutexGuard};

pub const BOOT_START: Address = Address::from_usize(0x1000_0000);
pub const BOOT_SIZE: usize = 0x10_0000;
pub const HEAP_START: Address = Address::from_usize(0x2000_0000);

pub const HUB_OF_HUBS: Address = BOOT_START;
pub const CLASS_HUB: Address = BOOT_START.add(0x100);
pub const FREE_CHUNK_HUB: Address = BOOT_START.add(0x200);
pub const SCHEME_OBJECT: Address = BOOT_START.add(0x1000);
const DESCRIPTORS: Address = BOOT_START.add(0x2000);
const DESCRIPTOR_SIZE: usize = 0x40;
const REGION_TABLE: Address = BOOT_START.add(0x8000);

/// Tag the mock collector puts in the low bits of a forwarding word.
pub const FORWARDING_TAG: usize = 1;

/// Where each collector field lives, relative to the object holding it.
const FIELD_OFFSETS: &[(CollectorField, usize)] = &[
    (CollectorField::HeapPhase, 0x08),
    (CollectorField::GcStartedCount, 0x10),
    (CollectorField::GcCompletedCount, 0x18),
    (CollectorField::FullCollectionCount, 0x20),
    (CollectorField::ToSpace, 0x28),
    (CollectorField::FromSpace, 0x30),
    (CollectorField::YoungSpace, 0x38),
    (CollectorField::OldToSpace, 0x40),
    (CollectorField::OldFromSpace, 0x48),
    (CollectorField::EvacuationMark, 0x50),
    (CollectorField::MarkSweepSpace, 0x58),
    (CollectorField::RegionTable, 0x60),
    (CollectorField::RegionCount, 0x68),
    (CollectorField::RegionStart, 0x08),
    (CollectorField::RegionSize, 0x10),
    (CollectorField::RegionMark, 0x18),
];

#[derive(Default)]
struct MockState {
    bytes: HashMap<usize, u8>,
    mapped: Vec<Range<Address>>,
    scheme_name: Option<String>,
    started: bool,
    hidden_fields: HashSet<CollectorField>,
    next_region: Address,
    descriptors: usize,
    marks: HashSet<Address>,
    marks_available: bool,
    marks_unreadable: bool,
    tlabs: Vec<Range<Address>>,
    busy: bool,
    locked: bool,
    breakpoint_busy: bool,
    breakpoints: Vec<HeapPhase>,
    lock_count: usize,
}

impl MockState {
    fn is_mapped(&self, address: Address, len: usize) -> bool {
        self.mapped
            .iter()
            .any(|r| r.start <= address && address + len <= r.end)
    }

    fn write_word(&mut self, address: Address, value: Word) {
        for (i, byte) in value.to_le_bytes().iter().enumerate() {
            self.bytes.insert(address.as_usize() + i, *byte);
        }
    }

    fn read_word(&self, address: Address) -> Word {
        let mut buf = [0u8; BYTES_IN_WORD];
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self
                .bytes
                .get(&(address.as_usize() + i))
                .copied()
                .unwrap_or(0);
        }
        Word::from_le_bytes(buf)
    }

    fn field(&self, field: CollectorField) -> usize {
        FIELD_OFFSETS
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, offset)| *offset)
            .unwrap()
    }

    fn write_field(&mut self, object: Address, field: CollectorField, value: Word) {
        let offset = self.field(field);
        self.write_word(object + offset, value);
    }

    fn read_field(&self, object: Address, field: CollectorField) -> Word {
        self.read_word(object + self.field(field))
    }

    fn clear(&mut self, range: Range<Address>) {
        self.bytes
            .retain(|a, _| !(range.start.as_usize() <= *a && *a < range.end.as_usize()));
    }
}

/// A simulated target VM. All methods take `&self`; the state is behind a mutex so that the
/// mock can be shared with the inspector through an `Arc`.
pub struct MockRemoteVM {
    state: Mutex<MockState>,
}

impl MockRemoteVM {
    /// A target running the collector called `scheme_name`, with its scheme object already
    /// discoverable, in MUTATING with no collection yet.
    pub fn new(scheme_name: &str) -> Self {
        let vm = Self::unstarted(scheme_name);
        vm.start();
        vm
    }

    /// A target whose heap scheme object is not discoverable yet.
    pub fn unstarted(scheme_name: &str) -> Self {
        let mut state = MockState {
            scheme_name: Some(scheme_name.to_string()),
            next_region: HEAP_START,
            marks_available: true,
            ..Default::default()
        };
        state.mapped.push(BOOT_START..BOOT_START + BOOT_SIZE);
        state.write_word(HUB_OF_HUBS, HUB_OF_HUBS.as_usize());
        state.write_word(CLASS_HUB, HUB_OF_HUBS.as_usize());
        state.write_word(FREE_CHUNK_HUB, HUB_OF_HUBS.as_usize());
        state.write_word(SCHEME_OBJECT, HUB_OF_HUBS.as_usize());
        state.write_field(SCHEME_OBJECT, CollectorField::HeapPhase, HeapPhase::Mutating.ordinal() as Word);
        MockRemoteVM {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the heap scheme object discoverable.
    pub fn start(&self) {
        self.state().started = true;
    }

    /// Pretend the target's class metadata does not describe `field` yet.
    pub fn hide_field(&self, field: CollectorField) {
        self.state().hidden_fields.insert(field);
    }

    pub fn reveal_field(&self, field: CollectorField) {
        self.state().hidden_fields.remove(&field);
    }

    pub fn read_word_at(&self, address: Address) -> Word {
        self.state().read_word(address)
    }

    pub fn write_word_at(&self, address: Address, value: Word) {
        self.state().write_word(address, value)
    }

    // Regions

    /// Map a new heap region of `size` bytes and create its descriptor. Returns the descriptor.
    pub fn add_region(&self, size: usize) -> Address {
        let mut state = self.state();
        let start = state.next_region;
        state.next_region = start + size;
        state.mapped.push(start..start + size);
        let descriptor = DESCRIPTORS + state.descriptors * DESCRIPTOR_SIZE;
        state.descriptors += 1;
        state.write_word(descriptor, HUB_OF_HUBS.as_usize());
        state.write_field(descriptor, CollectorField::RegionStart, start.as_usize());
        state.write_field(descriptor, CollectorField::RegionSize, size);
        state.write_field(descriptor, CollectorField::RegionMark, start.as_usize());
        descriptor
    }

    /// Point a scheme field at a region descriptor (or any other address).
    pub fn set_scheme_field(&self, field: CollectorField, value: Address) {
        self.state()
            .write_field(SCHEME_OBJECT, field, value.as_usize());
    }

    pub fn scheme_field(&self, field: CollectorField) -> Address {
        Address::from_usize(self.state().read_field(SCHEME_OBJECT, field))
    }

    /// Exchange the descriptors held by two scheme fields, as a semispace flip does.
    pub fn flip(&self, a: CollectorField, b: CollectorField) {
        let mut state = self.state();
        let first = state.read_field(SCHEME_OBJECT, a);
        let second = state.read_field(SCHEME_OBJECT, b);
        state.write_field(SCHEME_OBJECT, a, second);
        state.write_field(SCHEME_OBJECT, b, first);
    }

    /// Lay out a region table holding `descriptors`.
    pub fn set_region_table(&self, descriptors: &[Address]) {
        let mut state = self.state();
        for (i, d) in descriptors.iter().enumerate() {
            state.write_word(REGION_TABLE + i * BYTES_IN_WORD, d.as_usize());
        }
        state.write_field(SCHEME_OBJECT, CollectorField::RegionTable, REGION_TABLE.as_usize());
        state.write_field(SCHEME_OBJECT, CollectorField::RegionCount, descriptors.len());
    }

    pub fn region_start(&self, descriptor: Address) -> Address {
        Address::from_usize(self.state().read_field(descriptor, CollectorField::RegionStart))
    }

    pub fn region_mark(&self, descriptor: Address) -> Address {
        Address::from_usize(self.state().read_field(descriptor, CollectorField::RegionMark))
    }

    pub fn set_region_mark(&self, descriptor: Address, mark: Address) {
        self.state()
            .write_field(descriptor, CollectorField::RegionMark, mark.as_usize());
    }

    /// Empty a region: zero its memory and reset its allocation mark.
    pub fn reset_region(&self, descriptor: Address) {
        let mut state = self.state();
        let start = Address::from_usize(state.read_field(descriptor, CollectorField::RegionStart));
        let size = state.read_field(descriptor, CollectorField::RegionSize);
        state.clear(start..start + size);
        state.write_field(descriptor, CollectorField::RegionMark, start.as_usize());
    }

    // Objects

    /// Bump-allocate an object of `words` words (header included) in a region.
    pub fn alloc(&self, descriptor: Address, words: usize) -> Address {
        let mut state = self.state();
        let mark = Address::from_usize(state.read_field(descriptor, CollectorField::RegionMark));
        let start = Address::from_usize(state.read_field(descriptor, CollectorField::RegionStart));
        let size = state.read_field(descriptor, CollectorField::RegionSize);
        let end = mark + words * BYTES_IN_WORD;
        assert!(end <= start + size, "region {} is full", descriptor);
        state.write_word(mark, CLASS_HUB.as_usize());
        for i in 1..words {
            state.write_word(mark + i * BYTES_IN_WORD, 0);
        }
        state.write_field(descriptor, CollectorField::RegionMark, end.as_usize());
        mark
    }

    /// Write an object header at `origin` without moving any allocation mark, as a free-list
    /// allocator would.
    pub fn place_object(&self, origin: Address) {
        self.state().write_word(origin, CLASS_HUB.as_usize());
    }

    /// Copy the object at `from` into `descriptor`'s region and leave a forwarding word behind.
    /// Returns the new origin.
    pub fn forward(&self, from: Address, descriptor: Address, words: usize) -> Address {
        let to = self.alloc(descriptor, words);
        self.install_forwarding(from, to);
        to
    }

    /// Overwrite the hub word at `from` with a forwarding pointer to `to`.
    pub fn install_forwarding(&self, from: Address, to: Address) {
        self.state()
            .write_word(from, to.as_usize() | FORWARDING_TAG);
    }

    /// Format the memory at `origin` as a free chunk.
    pub fn make_free_chunk(&self, origin: Address) {
        self.state().write_word(origin, FREE_CHUNK_HUB.as_usize());
    }

    /// Scribble over an object header, e.g. to simulate reuse of swept memory.
    pub fn clobber(&self, origin: Address) {
        self.state().write_word(origin, 0);
    }

    // Collector bookkeeping

    pub fn phase(&self) -> HeapPhase {
        let ordinal = self.state().read_field(SCHEME_OBJECT, CollectorField::HeapPhase) as i32;
        HeapPhase::from_ordinal(ordinal).unwrap()
    }

    fn set_phase(&self, phase: HeapPhase) {
        self.state().write_field(
            SCHEME_OBJECT,
            CollectorField::HeapPhase,
            phase.ordinal() as Word,
        );
    }

    fn bump(&self, field: CollectorField) {
        let mut state = self.state();
        let value = state.read_field(SCHEME_OBJECT, field);
        state.write_field(SCHEME_OBJECT, field, value + 1);
    }

    pub fn gc_started(&self) -> u64 {
        self.state().read_field(SCHEME_OBJECT, CollectorField::GcStartedCount) as u64
    }

    pub fn gc_completed(&self) -> u64 {
        self.state().read_field(SCHEME_OBJECT, CollectorField::GcCompletedCount) as u64
    }

    /// Start a collection: bump the started counter (and the full counter for a full
    /// collection) and enter ANALYZING.
    pub fn start_gc(&self, full: bool) {
        self.bump(CollectorField::GcStartedCount);
        if full {
            self.bump(CollectorField::FullCollectionCount);
        }
        self.set_phase(HeapPhase::Analyzing);
    }

    pub fn enter_reclaiming(&self) {
        self.set_phase(HeapPhase::Reclaiming);
    }

    /// Complete the collection in progress and resume mutating.
    pub fn finish_gc(&self) {
        self.bump(CollectorField::GcCompletedCount);
        self.set_phase(HeapPhase::Mutating);
    }

    pub fn mark(&self, origin: Address) {
        self.state().marks.insert(origin);
    }

    pub fn clear_marks(&self) {
        self.state().marks.clear();
    }

    /// Make [`CollectorInspection::is_marked`] report mark bits as unavailable.
    pub fn set_marks_available(&self, available: bool) {
        self.state().marks_available = available;
    }

    /// Make every mark bit read fail as if the bitmap memory could not be read.
    pub fn set_marks_unreadable(&self, unreadable: bool) {
        self.state().marks_unreadable = unreadable;
    }

    pub fn set_tlabs(&self, tlabs: Vec<Range<Address>>) {
        self.state().tlabs = tlabs;
    }

    // Process control

    /// Make the target refuse the inspection lock.
    pub fn set_busy(&self, busy: bool) {
        self.state().busy = busy;
    }

    /// Make the target refuse phase breakpoints.
    pub fn set_breakpoint_busy(&self, busy: bool) {
        self.state().breakpoint_busy = busy;
    }

    pub fn breakpoints(&self) -> Vec<HeapPhase> {
        self.state().breakpoints.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    /// How many times the inspection lock has been taken.
    pub fn lock_count(&self) -> usize {
        self.state().lock_count
    }
}

impl RemoteMemory for MockRemoteVM {
    fn read_bytes(&self, address: Address, buf: &mut [u8]) -> Result<()> {
        let state = self.state();
        if !state.is_mapped(address, buf.len()) {
            return Err(TeleError::RemoteAccess(address));
        }
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = state
                .bytes
                .get(&(address.as_usize() + i))
                .copied()
                .unwrap_or(0);
        }
        Ok(())
    }
}

impl CollectorInspection for MockRemoteVM {
    fn heap_scheme_name(&self) -> Option<String> {
        self.state().scheme_name.clone()
    }

    fn heap_scheme_object(&self) -> Option<Address> {
        self.state().started.then_some(SCHEME_OBJECT)
    }

    fn field_offset(&self, field: CollectorField) -> Option<usize> {
        let state = self.state();
        if state.hidden_fields.contains(&field) {
            return None;
        }
        Some(state.field(field))
    }

    fn boot_regions(&self) -> Vec<Range<Address>> {
        vec![BOOT_START..BOOT_START + BOOT_SIZE]
    }

    fn free_chunk_hub(&self) -> Option<Address> {
        Some(FREE_CHUNK_HUB)
    }

    fn is_marked(&self, origin: Address) -> Result<bool> {
        let state = self.state();
        if !state.marks_available {
            return Err(TeleError::Unavailable("mark bits"));
        }
        if state.marks_unreadable {
            return Err(TeleError::RemoteAccess(origin));
        }
        Ok(state.marks.contains(&origin))
    }

    fn tlab_free_ranges(&self) -> Result<Vec<Range<Address>>> {
        Ok(self.state().tlabs.clone())
    }
}

impl ProcessControl for MockRemoteVM {
    fn try_lock_process(&self) -> bool {
        let mut state = self.state();
        if state.busy || state.locked {
            return false;
        }
        state.locked = true;
        state.lock_count += 1;
        true
    }

    fn unlock_process(&self) {
        self.state().locked = false;
    }

    fn add_gc_phase_breakpoint(&self, phase: HeapPhase) -> Result<()> {
        let mut state = self.state();
        if state.breakpoint_busy {
            return Err(TeleError::Busy);
        }
        if !state.breakpoints.contains(&phase) {
            state.breakpoints.push(phase);
        }
        Ok(())
    }
}

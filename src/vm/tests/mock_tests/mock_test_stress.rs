// A seeded random run of a semispace target. The collector skips halts at random, and the
// inspector's model is checked against what the mock actually did after every refresh.

use super::mock_test_prelude::*;
use crate::reference::RemoteRef;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

const ROUNDS: usize = 300;
const MAX_LIVE: usize = 200;

struct Held {
    reference: RemoteRef,
    /// Where the object should be after the last collection, or `None` once the model has lost
    /// track of it.
    expected: Option<Address>,
}

struct Checker {
    last: Option<SchemeStats>,
}

impl Checker {
    fn refresh(&mut self, fixture: &mut InspectorFixture) {
        fixture.refresh();
        let stats = fixture.inspector.stats();
        fixture.assert_maps_consistent();

        // Refreshing again at the same epoch changes nothing.
        fixture
            .inspector
            .update_memory_status(fixture.epoch)
            .unwrap();
        assert_eq!(fixture.inspector.stats(), stats);

        if let Some(last) = &self.last {
            assert!(stats.counters.gc_started >= last.counters.gc_started);
            assert!(stats.counters.gc_completed >= last.counters.gc_completed);
        }
        assert_eq!(stats.last_update_epoch, Some(fixture.epoch));
        assert!(!fixture.vm.is_locked());
        self.last = Some(stats);
    }
}

/// Track both ends of a relocation the model has not discovered yet, in either order.
fn link_both_ends(
    fixture: &mut InspectorFixture,
    from: Address,
    to: Address,
    forwarder_first: bool,
) {
    let (forwarder, copy) = if forwarder_first {
        let forwarder = fixture.inspector.make_quasi_reference(from).unwrap().unwrap();
        (forwarder, fixture.reference(to))
    } else {
        let copy = fixture.reference(to);
        (fixture.inspector.make_quasi_reference(from).unwrap().unwrap(), copy)
    };
    assert_eq!(forwarder.forwarded_to(), Some(to));
    assert_eq!(copy.forwarded_from(), Some(from));
    fixture.assert_maps_consistent();
}

fn run(seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (mut fixture, mut heap) = semispace_fixture();
    let vm = fixture.vm.clone();
    let mut checker = Checker { last: None };
    let mut live: Vec<Address> = vec![];
    let mut held: Vec<Held> = vec![];

    for _ in 0..ROUNDS {
        match rng.random_range(0..10) {
            0..=3 if live.len() < MAX_LIVE => {
                for _ in 0..rng.random_range(1..8) {
                    live.push(vm.alloc(heap.to, OBJECT_WORDS));
                }
                checker.refresh(&mut fixture);
            }
            4..=5 if !live.is_empty() => {
                let origin = live[rng.random_range(0..live.len())];
                let reference = fixture.reference(origin);
                assert_eq!(reference.origin(), origin);
                assert_eq!(reference.status(), ObjectStatus::Live);
                held.push(Held {
                    reference,
                    expected: Some(origin),
                });
            }
            6 if !held.is_empty() => {
                held.swap_remove(rng.random_range(0..held.len()));
            }
            _ => {
                let observe_analysis = rng.random_bool(0.6);
                let observe_reclaim = rng.random_bool(0.6);
                heap.start_gc(&vm);
                if observe_analysis {
                    checker.refresh(&mut fixture);
                    assert_eq!(fixture.inspector.phase(), HeapPhase::Analyzing);
                }
                let mut moved = HashMap::new();
                let mut survivors = vec![];
                for origin in live.drain(..) {
                    if rng.random_bool(0.5) {
                        let to = heap.evacuate(&vm, origin);
                        moved.insert(origin, to);
                        survivors.push((origin, to));
                    }
                }
                if observe_analysis && !survivors.is_empty() {
                    let (from, to) = survivors[rng.random_range(0..survivors.len())];
                    if fixture.status(from) == ObjectStatus::Forwarder {
                        link_both_ends(&mut fixture, from, to, rng.random_bool(0.5));
                    }
                }
                live = survivors.into_iter().map(|(_, to)| to).collect();
                vm.enter_reclaiming();
                if observe_reclaim {
                    checker.refresh(&mut fixture);
                    assert_eq!(fixture.inspector.phase(), HeapPhase::Reclaiming);
                }
                vm.finish_gc();
                checker.refresh(&mut fixture);

                let observed = observe_analysis || observe_reclaim;
                for h in held.iter_mut() {
                    h.expected = h
                        .expected
                        .filter(|_| observed)
                        .and_then(|origin| moved.get(&origin).copied());
                }
            }
        }

        if fixture.inspector.phase() == HeapPhase::Mutating {
            for h in &held {
                match h.expected {
                    Some(origin) => {
                        assert_eq!(h.reference.status(), ObjectStatus::Live);
                        assert_eq!(h.reference.origin(), origin);
                        assert_eq!(h.reference.forwarded_from(), None);
                        assert_eq!(fixture.status(origin), ObjectStatus::Live);
                    }
                    None => assert_eq!(h.reference.status(), ObjectStatus::Dead),
                }
            }
        }
    }
}

#[test]
pub fn random_semispace_run() {
    for seed in 0..4 {
        run(seed);
    }
}

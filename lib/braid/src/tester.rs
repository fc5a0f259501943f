//! In-process harness for multi-peer protocols: one engine per identity,
//! frames carried between them over per-direction FIFO queues in a
//! seed-randomized interleaving. Per-channel ordering matches the real
//! transport; cross-channel ordering is deliberately scrambled so tests
//! exercise the orderings the network is allowed to produce.

use crate::engine::Engine;
use crate::net::frame::WireFrame;
use crate::peerset::VectorPeerSet;
use crate::protlet::Protlet;
use keel::logging;
use keel::Identity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, VecDeque};

const DEFAULT_SEED: u64 = 0x5eed_cafe;

/// Run one root protlet per identity until every run finishes or any peer
/// aborts. Returns true only when every root delivered.
pub fn run_tests<I: Identity>(roots: BTreeMap<I, Box<dyn Protlet<I>>>) -> bool {
    run_tests_seeded(roots, DEFAULT_SEED)
}

pub fn run_tests_seeded<I: Identity>(roots: BTreeMap<I, Box<dyn Protlet<I>>>, seed: u64) -> bool {
    let log = logging::discard();
    let peerset: VectorPeerSet<I> = roots.keys().cloned().collect();

    let mut engines: BTreeMap<I, Engine<I>> = roots
        .into_iter()
        .map(|(identity, root)| {
            let engine_log = log.new(logging::o!());
            let engine = Engine::new(identity.clone(), &peerset, root, engine_log);
            (identity, engine)
        })
        .collect();

    for engine in engines.values_mut() {
        engine.start();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut queues: BTreeMap<(I, I), VecDeque<WireFrame>> = BTreeMap::new();

    loop {
        // collect freshly produced frames
        for (src, engine) in engines.iter_mut() {
            for (dst, frames) in engine.outbox().iter_mut() {
                while let Some(frame) = frames.pop_front() {
                    queues
                        .entry((src.clone(), dst.clone()))
                        .or_insert_with(VecDeque::new)
                        .push_back(frame);
                }
            }
        }

        let loaded: Vec<(I, I)> = queues
            .iter()
            .filter(|entry| !entry.1.is_empty())
            .map(|entry| entry.0.clone())
            .collect();
        if loaded.is_empty() {
            break;
        }

        // deliver one frame from one randomly chosen directed channel,
        // preserving FIFO within the channel
        let (src, dst) = loaded[rng.gen_range(0..loaded.len())].clone();
        let frame = queues
            .get_mut(&(src.clone(), dst.clone()))
            .and_then(|queue| queue.pop_front())
            .expect("picked channel cannot be empty");
        if let Some(engine) = engines.get_mut(&dst) {
            engine.handle_frame(&src, frame);
        }
    }

    engines.values().all(|engine| engine.is_finished())
}

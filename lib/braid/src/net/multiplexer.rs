//! The single-threaded event loop that drives one engine over the transport:
//! poll the sockets, parse inbound frames into the engine, drain the
//! engine's outbox back out.

use crate::engine::Engine;
use crate::net::channel::{Channel, WRITE_BUF_SIZE};
use crate::net::transport::{establish, PeerInfo};
use crate::net::{NetworkError, NetworkResult};
use crate::peerset::VectorPeerSet;
use crate::protlet::Protlet;
use indexmap::IndexMap;
use keel::logging::{self, Logger};
use keel::Identity;
use mio::{Events, Poll, Token};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to keep flushing once the run itself is over. Final completes
/// and aborts should leave the process, but a wedged peer must not pin us.
const SHUTDOWN_FLUSH_GRACE: Duration = Duration::from_secs(5);

/// Above this many buffered outbound bytes on any channel the loop stops
/// parsing new inbound frames until the backlog drains.
const HIGH_WATER: usize = WRITE_BUF_SIZE / 2;

/// Run one protlet tree to completion against the given peer table.
///
/// `peers` must contain an entry for the local identity (its address is the
/// listen address). Returns true when the root protlet delivered, false when
/// any peer aborted or the transport failed. Results flow through whatever
/// caller-owned state the root protlet mutates.
pub fn run_protlet<I: Identity>(
    root: Box<dyn Protlet<I>>,
    peers: &[PeerInfo<I>],
    self_identity: I,
    log: &Logger,
) -> bool {
    let peerset: VectorPeerSet<I> = peers.iter().map(|p| p.identity.clone()).collect();
    let engine_log = log.new(logging::o!("peer" => self_identity.to_string()));
    let mut engine = Engine::new(self_identity, &peerset, root, engine_log);

    // a run of one needs no sockets at all
    if peerset.len() <= 1 {
        engine.start();
        return engine.is_finished();
    }

    match run_inner(&mut engine, peers, log) {
        Ok(finished) => finished,
        Err(err) => {
            logging::warn!(log, "transport failure ended the run"; "error" => ?err);
            false
        }
    }
}

fn run_inner<I: Identity>(
    engine: &mut Engine<I>,
    peers: &[PeerInfo<I>],
    log: &Logger,
) -> NetworkResult<bool> {
    let mut poll = Poll::new()?;

    let opened = establish(engine.self_identity(), peers, &mut poll, log)?;
    let mut channels: IndexMap<I, Channel> = IndexMap::new();
    for (identity, channel) in opened {
        channels.insert(identity, channel);
    }
    for (index, channel) in channels.values_mut().enumerate() {
        channel.register(poll.registry(), Token(index))?;
    }

    engine.start();

    let mut events = Events::with_capacity(256);
    let mut flush_deadline: Option<Instant> = None;

    loop {
        pump(engine, &mut channels)?;

        if !engine.is_running() {
            if drained(engine, &channels) {
                return Ok(engine.is_finished());
            }
            let deadline = *flush_deadline.get_or_insert(Instant::now() + SHUTDOWN_FLUSH_GRACE);
            if Instant::now() > deadline {
                logging::warn!(log, "shutdown flush timed out with bytes still queued");
                return Ok(engine.is_finished());
            }
        }

        let backpressured = channels.values().any(|c| c.egress_len() > HIGH_WATER);

        poll.poll(&mut events, Some(POLL_INTERVAL))?;

        for event in events.iter() {
            let (peer, channel) = match channels.get_index_mut(event.token().0) {
                Some(entry) => entry,
                None => continue,
            };

            if event.is_writable() {
                match channel.send() {
                    Ok(_) | Err(NetworkError::Wait) => (),
                    Err(fatal) => return fail(engine, fatal),
                }
            }

            if event.is_readable() && engine.is_running() && !backpressured {
                match channel.receive() {
                    Ok(_) | Err(NetworkError::Wait) => (),
                    Err(fatal) => return fail(engine, fatal),
                }
                loop {
                    match channel.read_frame() {
                        Ok(frame) => engine.handle_frame(peer, frame),
                        Err(NetworkError::Wait) => break,
                        Err(fatal) => return fail(engine, fatal),
                    }
                }
            }
        }
    }
}

/// Move outbox frames into channel write buffers and flush what the sockets
/// will take.
fn pump<I: Identity>(
    engine: &mut Engine<I>,
    channels: &mut IndexMap<I, Channel>,
) -> NetworkResult<()> {
    for (peer, channel) in channels.iter_mut() {
        if let Some(queue) = engine.outbox().get_mut(peer) {
            while let Some(frame) = queue.front() {
                match channel.write_frame(frame) {
                    Ok(()) => {
                        queue.pop_front();
                    }
                    Err(NetworkError::Wait) => break,
                    Err(fatal) => return Err(fatal),
                }
            }
        }
        match channel.send() {
            Ok(_) | Err(NetworkError::Wait) => (),
            Err(fatal) => return Err(fatal),
        }
    }
    Ok(())
}

/// True once every queued frame has left the process.
fn drained<I: Identity>(engine: &mut Engine<I>, channels: &IndexMap<I, Channel>) -> bool {
    engine.outbox().values().all(|queue| queue.is_empty())
        && channels.values().all(|channel| !channel.has_egress())
}

/// A fatal transport error: make sure the abort goes out best-effort, then
/// report failure.
fn fail<I: Identity>(engine: &mut Engine<I>, err: NetworkError) -> NetworkResult<bool> {
    engine.abort_run("transport failure");
    Err(err)
}

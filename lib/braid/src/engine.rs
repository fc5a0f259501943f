//! The protlet execution engine.
//!
//! The engine owns one handler record per live protlet, converts the actions
//! handlers emit into wire frames, and routes inbound frames back into
//! handler invocations. Ids are drawn from a single monotonic counter per
//! peer, so every id is unique across a run; cross-peer correspondence is
//! established by announce frames, and every frame on the wire carries the
//! *sender's* id of its target (the parent for announces, the protlet itself
//! for messages and completes). The receiving engine resolves `(peer, id)`
//! through binding tables fed by the announces.
//!
//! Frames that arrive before their protlet has been invoked locally are
//! parked under the announced pending-child slot and replayed, in arrival
//! order, once the invoke happens.

use crate::message::{IncomingMessage, OutgoingMessage};
use crate::net::frame::{Control, WireFrame};
use crate::peerset::VectorPeerSet;
use crate::protlet::{Action, Context, Finished, Protlet, ProtletId, ID_INVALID, ROOT_ID};
use hashbrown::HashMap;
use keel::logging::{self, Logger};
use keel::Identity;
use std::collections::VecDeque;
use std::mem;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Binding {
    /// The remote id maps onto a live local protlet.
    Live(ProtletId),
    /// The remote id was announced but the matching local invoke has not
    /// happened yet; the value is the live parent holding the parked slot.
    Parked(ProtletId),
}

struct ParkedChild {
    remote_id: ProtletId,
    cache: VecDeque<WireFrame>,
}

struct HandlerRecord<I: Identity> {
    parent: Option<ProtletId>,
    peers: VectorPeerSet<I>,
    implementation: Option<Box<dyn Protlet<I>>>,
    /// Children whose ids are not yet synchronized with every peer.
    womb: Vec<ProtletId>,
    /// Children fully synchronized and live.
    cradle: Vec<ProtletId>,
    /// Frames received after creation but before full id sync.
    cache: VecDeque<(I, WireFrame)>,
    /// Announced-but-not-yet-invoked children, per announcing peer.
    parked: HashMap<I, VecDeque<ParkedChild>>,
    promised: bool,
    completed: bool,
    collected: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum RunState {
    Running,
    Finished,
    Aborted,
}

pub struct Engine<I: Identity> {
    self_identity: I,
    counter: ProtletId,
    handlers: HashMap<ProtletId, HandlerRecord<I>>,
    bindings: HashMap<I, HashMap<ProtletId, Binding>>,
    outbox: HashMap<I, VecDeque<WireFrame>>,
    awaiters: HashMap<ProtletId, ProtletId>,
    state: RunState,
    log: Logger,
}

impl<I: Identity> Engine<I> {
    /// Builds an engine with its root protlet in place. `peers` must contain
    /// the local identity; the root carries [`ROOT_ID`] on every peer, which
    /// seeds the binding tables.
    pub fn new(
        self_identity: I,
        peers: &VectorPeerSet<I>,
        root: Box<dyn Protlet<I>>,
        log: Logger,
    ) -> Engine<I> {
        assert!(
            peers.has_peer(&self_identity),
            "peer table must include the local identity"
        );

        let mut root_peers = peers.clone();
        peers.for_each(|peer| root_peers.set_id(peer, ROOT_ID));

        let mut bindings = HashMap::new();
        peers.for_each(|peer| {
            if *peer != self_identity {
                let mut map = HashMap::new();
                map.insert(ROOT_ID, Binding::Live(ROOT_ID));
                bindings.insert(peer.clone(), map);
            }
        });

        let mut handlers = HashMap::new();
        handlers.insert(
            ROOT_ID,
            HandlerRecord {
                parent: None,
                peers: root_peers,
                implementation: Some(root),
                womb: Vec::new(),
                cradle: Vec::new(),
                cache: VecDeque::new(),
                parked: HashMap::new(),
                promised: false,
                completed: false,
                collected: false,
            },
        );

        Engine {
            self_identity,
            counter: ROOT_ID + 1,
            handlers,
            bindings,
            outbox: HashMap::new(),
            awaiters: HashMap::new(),
            state: RunState::Running,
            log,
        }
    }

    pub fn self_identity(&self) -> &I {
        &self.self_identity
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state == RunState::Finished
    }

    pub fn is_aborted(&self) -> bool {
        self.state == RunState::Aborted
    }

    /// Frames waiting to be shipped, per destination peer.
    pub fn outbox(&mut self) -> &mut HashMap<I, VecDeque<WireFrame>> {
        &mut self.outbox
    }

    /// Runs the root protlet's `start` handler.
    pub fn start(&mut self) {
        logging::debug!(self.log, "starting root protlet"; "context" => "start");
        self.run_start(ROOT_ID);
    }

    /// Feed one inbound frame into the engine.
    pub fn handle_frame(&mut self, from: &I, frame: WireFrame) {
        if !self.is_running() {
            return;
        }
        self.dispatch(from, frame);
    }

    /// Local unrecoverable failure (transport or framing): broadcast ABORT
    /// and stop.
    pub fn abort_run(&mut self, why: &str) {
        if !self.is_running() {
            return;
        }
        logging::error!(self.log, "aborting run"; "context" => "abort", "why" => why);
        self.broadcast_abort();
    }

    fn dispatch(&mut self, from: &I, frame: WireFrame) {
        match frame.control {
            Control::Abort => {
                logging::warn!(self.log, "peer aborted the run";
                               "context" => "dispatch", "peer" => %from);
                self.state = RunState::Aborted;
            }
            Control::AnnounceChildId => {
                let child_remote = match frame.announced_child_id() {
                    Ok(id) => id,
                    Err(_) => {
                        self.abort_run("malformed announce payload");
                        return;
                    }
                };
                self.handle_announce(from, frame.dst, child_remote);
            }
            Control::ProtletMessage | Control::ProtletComplete => self.route(from, frame),
        }
    }

    fn handle_announce(&mut self, from: &I, parent_remote: ProtletId, child_remote: ProtletId) {
        let binding = self
            .bindings
            .get(from)
            .and_then(|map| map.get(&parent_remote))
            .copied();

        let parent_local = match binding {
            None => {
                self.abort_run("announce names an unknown parent");
                return;
            }
            Some(Binding::Parked(host)) => {
                // the parent itself has not been invoked locally; keep the
                // announce queued with it
                self.park_frame(
                    from,
                    host,
                    parent_remote,
                    WireFrame::announce(parent_remote, child_remote),
                );
                return;
            }
            Some(Binding::Live(parent_local)) => parent_local,
        };

        let mut target = None;
        match self.handlers.get(&parent_local) {
            Some(parent) => {
                for &cid in &parent.womb {
                    if let Some(child) = self.handlers.get(&cid) {
                        if child.peers.has_peer(from)
                            && child.peers.find_peer_id(from) == ID_INVALID
                        {
                            target = Some(cid);
                            break;
                        }
                    }
                }
            }
            None => {
                self.abort_run("announce for a collected parent");
                return;
            }
        }

        match target {
            Some(cid) => {
                if let Some(child) = self.handlers.get_mut(&cid) {
                    child.peers.set_id(from, child_remote);
                }
                self.bind(from, child_remote, Binding::Live(cid));
                logging::trace!(self.log, "bound child id";
                                "context" => "announce",
                                "peer" => %from,
                                "remote_id" => child_remote,
                                "local_id" => cid);
                self.sync_check(cid);
            }
            None => {
                if let Some(parent) = self.handlers.get_mut(&parent_local) {
                    parent
                        .parked
                        .entry(from.clone())
                        .or_default()
                        .push_back(ParkedChild {
                            remote_id: child_remote,
                            cache: VecDeque::new(),
                        });
                }
                self.bind(from, child_remote, Binding::Parked(parent_local));
                logging::trace!(self.log, "parked early announce";
                                "context" => "announce",
                                "peer" => %from,
                                "remote_id" => child_remote,
                                "parent" => parent_local);
            }
        }
    }

    fn route(&mut self, from: &I, frame: WireFrame) {
        let binding = self
            .bindings
            .get(from)
            .and_then(|map| map.get(&frame.dst))
            .copied();

        match binding {
            None => self.abort_run("frame for an unknown protlet"),
            Some(Binding::Parked(host)) => {
                let dst = frame.dst;
                self.park_frame(from, host, dst, frame);
            }
            Some(Binding::Live(local)) => self.deliver(local, from, frame),
        }
    }

    fn park_frame(&mut self, from: &I, host: ProtletId, remote_id: ProtletId, frame: WireFrame) {
        if let Some(rec) = self.handlers.get_mut(&host) {
            if let Some(queue) = rec.parked.get_mut(from) {
                if let Some(slot) = queue.iter_mut().find(|p| p.remote_id == remote_id) {
                    slot.cache.push_back(frame);
                    return;
                }
            }
        }
        self.abort_run("parked slot vanished");
    }

    fn deliver(&mut self, local: ProtletId, from: &I, frame: WireFrame) {
        let synced = match self.handlers.get(&local) {
            Some(rec) => rec.peers.has_all_peer_ids(),
            None => {
                self.abort_run("frame for a collected protlet");
                return;
            }
        };

        // a protlet is ready for its messages only once every peer's id for
        // it is known; until then they queue on the handler
        if !synced {
            if let Some(rec) = self.handlers.get_mut(&local) {
                rec.cache.push_back((from.clone(), frame));
            }
            return;
        }

        match frame.control {
            Control::ProtletMessage => self.run_on_message(local, from, frame.payload),
            Control::ProtletComplete => {
                if let Some(rec) = self.handlers.get_mut(&local) {
                    rec.peers.set_completed(from);
                }
                self.check_delivery(local);
            }
            _ => unreachable!("announce and abort are routed elsewhere"),
        }
    }

    fn bind(&mut self, from: &I, remote_id: ProtletId, binding: Binding) {
        self.bindings
            .entry(from.clone())
            .or_default()
            .insert(remote_id, binding);
    }

    /// Graduate a child out of the womb once all peers' ids are in, then
    /// replay whatever queued on it.
    fn sync_check(&mut self, id: ProtletId) {
        let ready = match self.handlers.get(&id) {
            Some(rec) => rec.peers.has_all_peer_ids(),
            None => return,
        };
        if !ready {
            return;
        }

        let parent = self.handlers.get(&id).and_then(|rec| rec.parent);
        if let Some(parent_id) = parent {
            if let Some(prec) = self.handlers.get_mut(&parent_id) {
                if let Some(pos) = prec.womb.iter().position(|&c| c == id) {
                    prec.womb.remove(pos);
                    prec.cradle.push(id);
                }
            }
        }

        let cached = match self.handlers.get_mut(&id) {
            Some(rec) => mem::take(&mut rec.cache),
            None => return,
        };
        if !cached.is_empty() {
            logging::debug!(self.log, "replaying cached frames";
                            "context" => "sync", "protlet" => id, "count" => cached.len());
        }
        for (from, frame) in cached {
            if !self.is_running() {
                return;
            }
            match frame.control {
                Control::ProtletMessage => self.run_on_message(id, &from, frame.payload),
                Control::ProtletComplete => {
                    if let Some(rec) = self.handlers.get_mut(&id) {
                        rec.peers.set_completed(&from);
                    }
                }
                _ => unreachable!("only messages and completes are cached on handlers"),
            }
        }

        self.check_delivery(id);
    }

    /// Take the implementation out, run one handler against a fresh action
    /// list, put it back, then interpret the actions.
    fn with_impl<F>(&mut self, id: ProtletId, f: F)
    where
        F: FnOnce(&mut dyn Protlet<I>, &mut Context<I>),
    {
        let (mut imp, peers) = match self.handlers.get_mut(&id) {
            Some(rec) => match rec.implementation.take() {
                Some(imp) => (imp, rec.peers.clone()),
                None => {
                    logging::trace!(self.log, "handler unavailable"; "protlet" => id);
                    return;
                }
            },
            None => {
                logging::trace!(self.log, "handler record gone"; "protlet" => id);
                return;
            }
        };

        let self_identity = self.self_identity.clone();
        let log = self.log.clone();
        let mut ctx = Context::new(id, &self_identity, &peers, &log, self.counter);
        f(imp.as_mut(), &mut ctx);
        let (actions, next_id) = ctx.into_parts();
        self.counter = next_id;

        if let Some(rec) = self.handlers.get_mut(&id) {
            rec.implementation = Some(imp);
        }

        self.interpret(id, actions);
    }

    fn run_start(&mut self, id: ProtletId) {
        self.with_impl(id, |protlet, ctx| protlet.start(ctx));
    }

    fn run_on_message(&mut self, id: ProtletId, from: &I, payload: Vec<u8>) {
        let mut msg = IncomingMessage::new(from.clone(), payload);
        self.with_impl(id, |protlet, ctx| protlet.on_message(&mut msg, ctx));
    }

    fn interpret(&mut self, id: ProtletId, actions: Vec<Action<I>>) {
        for action in actions {
            if !self.is_running() {
                return;
            }
            match action {
                Action::Send(msg) => self.act_send(id, msg),
                Action::Invoke {
                    child_id,
                    protlet,
                    peers,
                    promised,
                } => self.act_invoke(id, child_id, protlet, peers, promised),
                Action::Complete => self.act_complete(id),
                Action::Await(target) => self.act_await(id, target),
                Action::Abort => self.act_abort(id),
            }
        }
    }

    fn act_send(&mut self, id: ProtletId, msg: OutgoingMessage<I>) {
        let (recipient, payload) = msg.into_parts();

        if recipient == self.self_identity {
            logging::error!(self.log, "protlet addressed a message to itself"; "protlet" => id);
            self.abort_run("self-addressed message");
            return;
        }

        let in_set = self
            .handlers
            .get(&id)
            .map(|rec| rec.peers.has_peer(&recipient))
            .unwrap_or(false);
        if !in_set {
            logging::error!(self.log, "message recipient is outside the peer set";
                            "protlet" => id, "recipient" => %recipient);
            self.abort_run("message to a peer outside the protlet");
            return;
        }

        self.push_frame(&recipient, WireFrame::message(id, payload));
    }

    fn act_invoke(
        &mut self,
        parent_id: ProtletId,
        child_id: ProtletId,
        protlet: Box<dyn Protlet<I>>,
        peers: VectorPeerSet<I>,
        promised: bool,
    ) {
        // fresh copy: id slots and completion flags reset
        let mut child_peers = peers.clone();
        assert!(
            child_peers.has_peer(&self.self_identity),
            "invoking peer must belong to the child peer set"
        );

        match self.handlers.get_mut(&parent_id) {
            Some(parent) => {
                assert!(
                    child_peers.is_subset_of(&parent.peers),
                    "child peer set must be a subset of its parent's"
                );
                parent.womb.push(child_id);
            }
            None => {
                self.abort_run("invoke from a collected protlet");
                return;
            }
        }

        child_peers.set_id(&self.self_identity, child_id);
        let others: Vec<I> = child_peers
            .iter()
            .filter(|peer| **peer != self.self_identity)
            .cloned()
            .collect();

        logging::debug!(self.log, "invoking child";
                        "context" => "invoke",
                        "parent" => parent_id,
                        "child" => child_id,
                        "promised" => promised,
                        "peers" => child_peers.len());

        self.handlers.insert(
            child_id,
            HandlerRecord {
                parent: Some(parent_id),
                peers: child_peers,
                implementation: Some(protlet),
                womb: Vec::new(),
                cradle: Vec::new(),
                cache: VecDeque::new(),
                parked: HashMap::new(),
                promised,
                completed: false,
                collected: false,
            },
        );

        // the announce goes out before anything the child itself sends, so
        // on every channel the announce precedes the child's messages
        for peer in &others {
            self.push_frame(peer, WireFrame::announce(parent_id, child_id));
        }

        // adopt announces that arrived before this invoke, in arrival order
        let mut replay: Vec<(I, WireFrame)> = Vec::new();
        for peer in &others {
            let parked = match self.handlers.get_mut(&parent_id) {
                Some(parent) => parent
                    .parked
                    .get_mut(peer)
                    .and_then(|queue| queue.pop_front()),
                None => None,
            };
            if let Some(ParkedChild { remote_id, cache }) = parked {
                if let Some(child) = self.handlers.get_mut(&child_id) {
                    child.peers.set_id(peer, remote_id);
                }
                self.bind(peer, remote_id, Binding::Live(child_id));
                logging::debug!(self.log, "adopted early announce";
                                "context" => "invoke",
                                "child" => child_id,
                                "peer" => %peer,
                                "remote_id" => remote_id,
                                "cached_frames" => cache.len());
                for frame in cache {
                    replay.push((peer.clone(), frame));
                }
            }
        }

        self.run_start(child_id);

        for (peer, frame) in replay {
            if !self.is_running() {
                return;
            }
            self.dispatch(&peer, frame);
        }

        self.sync_check(child_id);
    }

    fn act_complete(&mut self, id: ProtletId) {
        let me = self.self_identity.clone();
        let others: Vec<I>;
        match self.handlers.get_mut(&id) {
            Some(rec) => {
                if rec.completed {
                    logging::warn!(self.log, "duplicate complete action"; "protlet" => id);
                    return;
                }
                rec.completed = true;
                rec.peers.set_completed(&me);
                others = rec.peers.iter().filter(|p| **p != me).cloned().collect();
            }
            None => return,
        }

        logging::debug!(self.log, "protlet completed locally";
                        "context" => "complete", "protlet" => id);

        for peer in &others {
            self.push_frame(peer, WireFrame::complete(id));
        }

        self.check_delivery(id);
    }

    fn act_await(&mut self, awaiter_id: ProtletId, target: ProtletId) {
        assert!(
            !self.awaiters.contains_key(&target),
            "promise {} awaited more than once",
            target
        );

        let ready = match self.handlers.get(&target) {
            Some(rec) => {
                assert!(rec.promised, "await targets a non-promised protlet");
                rec.completed && !rec.collected && rec.peers.check_all_complete()
            }
            None => panic!("await targets protlet {} which no longer exists", target),
        };

        if ready {
            self.deliver_promise(target, awaiter_id);
        } else {
            self.awaiters.insert(target, awaiter_id);
        }
    }

    fn act_abort(&mut self, id: ProtletId) {
        let name = self
            .handlers
            .get(&id)
            .and_then(|rec| rec.implementation.as_ref())
            .map(|p| p.name())
            .unwrap_or("collected protlet");
        logging::warn!(self.log, "protlet aborted the run";
                       "context" => "abort", "protlet" => id, "name" => name);
        self.broadcast_abort();
    }

    /// Deliver a completed child or a fulfilled promise once every peer's
    /// counterpart has reported completion.
    fn check_delivery(&mut self, id: ProtletId) {
        let (ready, promised, parent) = match self.handlers.get(&id) {
            Some(rec) => (
                rec.completed && !rec.collected && rec.peers.check_all_complete(),
                rec.promised,
                rec.parent,
            ),
            None => return,
        };
        if !ready {
            return;
        }

        match parent {
            None => {
                logging::info!(self.log, "root protlet delivered"; "context" => "complete");
                self.state = RunState::Finished;
            }
            Some(parent_id) => {
                if promised {
                    if let Some(awaiter) = self.awaiters.get(&id).copied() {
                        self.deliver_promise(id, awaiter);
                    }
                    // not awaited yet: the record stays until an await comes
                } else {
                    self.deliver_child(parent_id, id);
                }
            }
        }
    }

    fn deliver_child(&mut self, parent_id: ProtletId, child_id: ProtletId) {
        let mut child_impl = match self.handlers.get_mut(&child_id) {
            Some(rec) => {
                rec.collected = true;
                match rec.implementation.take() {
                    Some(imp) => imp,
                    None => {
                        self.abort_run("completed child has no implementation");
                        return;
                    }
                }
            }
            None => return,
        };

        logging::debug!(self.log, "delivering child completion";
                        "context" => "complete",
                        "parent" => parent_id,
                        "child" => child_id,
                        "name" => child_impl.name());

        self.with_impl(parent_id, |parent, ctx| {
            let mut finished = Finished::new(child_id, child_impl.as_mut());
            parent.on_child_done(&mut finished, ctx);
        });

        self.destroy(child_id);
    }

    fn deliver_promise(&mut self, promised_id: ProtletId, awaiter_id: ProtletId) {
        self.awaiters.remove(&promised_id);

        let mut promised_impl = match self.handlers.get_mut(&promised_id) {
            Some(rec) => {
                rec.collected = true;
                match rec.implementation.take() {
                    Some(imp) => imp,
                    None => return,
                }
            }
            None => return,
        };

        logging::debug!(self.log, "delivering promise";
                        "context" => "promise",
                        "promised" => promised_id,
                        "awaiter" => awaiter_id);

        self.with_impl(awaiter_id, |awaiter, ctx| {
            let mut finished = Finished::new(promised_id, promised_impl.as_mut());
            awaiter.on_promise_done(&mut finished, ctx);
        });

        self.destroy(promised_id);
    }

    fn destroy(&mut self, id: ProtletId) {
        let rec = match self.handlers.remove(&id) {
            Some(rec) => rec,
            None => return,
        };

        let mut stale = Vec::new();
        rec.peers.for_each(|peer| {
            if *peer != self.self_identity {
                let remote = rec.peers.find_peer_id(peer);
                if remote != ID_INVALID {
                    stale.push((peer.clone(), remote));
                }
            }
        });
        for (peer, remote) in stale {
            if let Some(map) = self.bindings.get_mut(&peer) {
                map.remove(&remote);
            }
        }

        if let Some(parent_id) = rec.parent {
            if let Some(parent) = self.handlers.get_mut(&parent_id) {
                parent.womb.retain(|&c| c != id);
                parent.cradle.retain(|&c| c != id);
            }
        }

        if rec.parked.values().any(|queue| !queue.is_empty()) {
            logging::warn!(self.log, "collected protlet still had parked announces";
                           "protlet" => id);
        }
    }

    fn broadcast_abort(&mut self) {
        let others: Vec<I> = match self.handlers.get(&ROOT_ID) {
            Some(root) => root
                .peers
                .iter()
                .filter(|peer| **peer != self.self_identity)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        for peer in &others {
            self.push_frame(peer, WireFrame::abort());
        }
        self.state = RunState::Aborted;
    }

    fn push_frame(&mut self, peer: &I, frame: WireFrame) {
        self.outbox
            .entry(peer.clone())
            .or_default()
            .push_back(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OutgoingMessage;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Trace = Rc<RefCell<Vec<u64>>>;

    fn pair() -> VectorPeerSet<String> {
        let mut ps = VectorPeerSet::new();
        ps.add("alice".to_owned());
        ps.add("bob".to_owned());
        ps
    }

    fn solo() -> VectorPeerSet<String> {
        let mut ps = VectorPeerSet::new();
        ps.add("alice".to_owned());
        ps
    }

    /// Completes in `start` without touching the network.
    struct InstantDone;

    impl Protlet<String> for InstantDone {
        fn start(&mut self, ctx: &mut Context<String>) {
            ctx.complete();
        }
        fn on_message(&mut self, _m: &mut IncomingMessage<String>, _c: &mut Context<String>) {}
        fn on_child_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
        fn on_promise_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
    }

    struct CountingParent {
        fanout: usize,
        seen: usize,
        ids: Trace,
    }

    impl Protlet<String> for CountingParent {
        fn start(&mut self, ctx: &mut Context<String>) {
            for _ in 0..self.fanout {
                let me: VectorPeerSet<String> = Some(ctx.self_identity().clone())
                    .into_iter()
                    .collect();
                let id = ctx.invoke(Box::new(InstantDone), me);
                self.ids.borrow_mut().push(id);
            }
        }
        fn on_message(&mut self, _m: &mut IncomingMessage<String>, _c: &mut Context<String>) {}
        fn on_child_done(&mut self, _f: &mut Finished<String>, ctx: &mut Context<String>) {
            self.seen += 1;
            if self.seen == self.fanout {
                ctx.complete();
            }
        }
        fn on_promise_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
    }

    #[test]
    fn solo_root_finishes_without_traffic() {
        let mut engine = Engine::new(
            "alice".to_owned(),
            &solo(),
            Box::new(InstantDone),
            logging::discard(),
        );
        engine.start();
        assert!(engine.is_finished());
        assert!(engine.outbox().values().all(|q| q.is_empty()));
    }

    #[test]
    fn child_ids_are_unique_and_all_deliver() {
        let ids: Trace = Rc::new(RefCell::new(Vec::new()));
        let mut engine = Engine::new(
            "alice".to_owned(),
            &solo(),
            Box::new(CountingParent {
                fanout: 10,
                seen: 0,
                ids: ids.clone(),
            }),
            logging::discard(),
        );
        engine.start();
        assert!(engine.is_finished());

        let mut seen = ids.borrow().clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 10);
    }

    /// Root that invokes a recording child only once poked by a message.
    struct LazyParent {
        recorder: Rc<RefCell<Vec<u8>>>,
    }

    struct Recorder {
        recorder: Rc<RefCell<Vec<u8>>>,
    }

    impl Protlet<String> for Recorder {
        fn start(&mut self, _ctx: &mut Context<String>) {}
        fn on_message(&mut self, msg: &mut IncomingMessage<String>, ctx: &mut Context<String>) {
            let byte = msg.read::<u8>().unwrap();
            self.recorder.borrow_mut().push(byte);
            if self.recorder.borrow().len() == 2 {
                ctx.complete();
            }
        }
        fn on_child_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
        fn on_promise_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
    }

    impl Protlet<String> for LazyParent {
        fn start(&mut self, _ctx: &mut Context<String>) {}
        fn on_message(&mut self, _msg: &mut IncomingMessage<String>, ctx: &mut Context<String>) {
            ctx.invoke(
                Box::new(Recorder {
                    recorder: self.recorder.clone(),
                }),
                ctx.peers().clone(),
            );
        }
        fn on_child_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
        fn on_promise_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
    }

    #[test]
    fn early_frames_replay_in_arrival_order() {
        let recorder = Rc::new(RefCell::new(Vec::new()));
        let bob = "bob".to_owned();
        let mut engine = Engine::new(
            "alice".to_owned(),
            &pair(),
            Box::new(LazyParent {
                recorder: recorder.clone(),
            }),
            logging::discard(),
        );
        engine.start();

        // bob invoked the child first: announce and two messages arrive
        // before alice's own invoke
        engine.handle_frame(&bob, WireFrame::announce(ROOT_ID, 41));
        engine.handle_frame(&bob, WireFrame::message(41, vec![0x2a]));
        engine.handle_frame(&bob, WireFrame::message(41, vec![0x2b]));
        assert!(recorder.borrow().is_empty());

        // poke the root so it invokes its counterpart of the child
        engine.handle_frame(&bob, WireFrame::message(ROOT_ID, Vec::new()));

        assert_eq!(*recorder.borrow(), vec![0x2a, 0x2b]);
        assert!(engine.is_running());
    }

    struct Aborting;

    impl Protlet<String> for Aborting {
        fn start(&mut self, ctx: &mut Context<String>) {
            ctx.abort();
        }
        fn on_message(&mut self, _m: &mut IncomingMessage<String>, _c: &mut Context<String>) {}
        fn on_child_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
        fn on_promise_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
    }

    #[test]
    fn abort_action_broadcasts_and_stops() {
        let mut engine = Engine::new(
            "alice".to_owned(),
            &pair(),
            Box::new(Aborting),
            logging::discard(),
        );
        engine.start();
        assert!(engine.is_aborted());
        let queued = engine.outbox().get_mut(&"bob".to_owned()).unwrap();
        assert_eq!(queued.pop_front().unwrap(), WireFrame::abort());
    }

    #[test]
    fn unknown_destination_aborts_the_run() {
        let mut engine = Engine::new(
            "alice".to_owned(),
            &pair(),
            Box::new(InstantDone),
            logging::discard(),
        );
        engine.start();
        engine.handle_frame(&"bob".to_owned(), WireFrame::message(77, vec![1]));
        assert!(engine.is_aborted());
    }

    struct PromisingRoot {
        fulfilled: Rc<RefCell<bool>>,
    }

    impl Protlet<String> for PromisingRoot {
        fn start(&mut self, ctx: &mut Context<String>) {
            let me: VectorPeerSet<String> = Some(ctx.self_identity().clone())
                .into_iter()
                .collect();
            let promise = ctx.promise(InstantDone, me);
            ctx.await_promise(&promise);
        }
        fn on_message(&mut self, _m: &mut IncomingMessage<String>, _c: &mut Context<String>) {}
        fn on_child_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
        fn on_promise_done(&mut self, finished: &mut Finished<String>, ctx: &mut Context<String>) {
            assert!(finished.downcast_mut::<InstantDone>().is_some());
            *self.fulfilled.borrow_mut() = true;
            ctx.complete();
        }
    }

    #[test]
    fn promise_completed_before_await_still_delivers() {
        let fulfilled = Rc::new(RefCell::new(false));
        let mut engine = Engine::new(
            "alice".to_owned(),
            &solo(),
            Box::new(PromisingRoot {
                fulfilled: fulfilled.clone(),
            }),
            logging::discard(),
        );
        engine.start();
        assert!(*fulfilled.borrow());
        assert!(engine.is_finished());
    }

    struct SelfSender;

    impl Protlet<String> for SelfSender {
        fn start(&mut self, ctx: &mut Context<String>) {
            ctx.send(OutgoingMessage::new(ctx.self_identity().clone()));
        }
        fn on_message(&mut self, _m: &mut IncomingMessage<String>, _c: &mut Context<String>) {}
        fn on_child_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
        fn on_promise_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
    }

    #[test]
    fn self_addressed_message_aborts() {
        let mut engine = Engine::new(
            "alice".to_owned(),
            &pair(),
            Box::new(SelfSender),
            logging::discard(),
        );
        engine.start();
        assert!(engine.is_aborted());
    }
}

//! The protlet model: one cooperative unit of protocol execution.
//!
//! A protlet is a state object with four event handlers. Handlers run to
//! completion without suspension; their only side effects are the actions
//! they append to the per-invocation [`Context`], which the engine interprets
//! after the handler returns. Between handler invocations the event loop may
//! service the network and other protlets.

use crate::message::{IncomingMessage, OutgoingMessage};
use crate::peerset::VectorPeerSet;
use keel::logging::Logger;
use keel::Identity;
use std::any::Any;
use std::marker::PhantomData;

pub type ProtletId = u64;

/// Sentinel for an id slot that has not been assigned yet.
pub const ID_INVALID: ProtletId = u64::MAX;

/// The root protlet carries id 0 on every peer, which is what lets the very
/// first frames of a run be routed before any announce has been exchanged.
pub const ROOT_ID: ProtletId = 0;

pub trait Protlet<I: Identity>: Any {
    /// Name used in logs. Not required to be unique.
    fn name(&self) -> &'static str {
        "unnamed protlet"
    }

    /// Called once, right after this protlet is invoked.
    fn start(&mut self, ctx: &mut Context<I>);

    /// Called when a message arrives for this protlet.
    fn on_message(&mut self, msg: &mut IncomingMessage<I>, ctx: &mut Context<I>);

    /// Called when a child invoked by this protlet has completed on every
    /// peer.
    fn on_child_done(&mut self, child: &mut Finished<I>, ctx: &mut Context<I>);

    /// Called when a promised protlet this protlet awaited has completed on
    /// every peer.
    fn on_promise_done(&mut self, promised: &mut Finished<I>, ctx: &mut Context<I>);
}

/// A completed protlet as handed to `on_child_done` / `on_promise_done`.
/// Carries the engine id so promises can check redemption, and supports
/// downcasting so parents can read results out of concrete child types.
pub struct Finished<'a, I: Identity> {
    id: ProtletId,
    protlet: &'a mut dyn Protlet<I>,
}

impl<'a, I: Identity> Finished<'a, I> {
    pub(crate) fn new(id: ProtletId, protlet: &'a mut dyn Protlet<I>) -> Finished<'a, I> {
        Finished { id, protlet }
    }

    pub fn id(&self) -> ProtletId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.protlet.name()
    }

    pub fn downcast_mut<T: Protlet<I>>(&mut self) -> Option<&mut T> {
        let any: &mut dyn Any = &mut *self.protlet;
        any.downcast_mut::<T>()
    }
}

/// Handle returned by [`Context::promise`]. Redeeming it against the
/// `Finished` passed to `on_promise_done` recovers the concrete promised
/// protlet, and with it whatever result the promised protlet produced.
pub struct Promise<F> {
    target: ProtletId,
    _marker: PhantomData<fn() -> F>,
}

impl<F> Promise<F> {
    pub(crate) fn new(target: ProtletId) -> Promise<F> {
        Promise {
            target,
            _marker: PhantomData,
        }
    }

    /// Engine id of the promised protlet.
    pub fn target(&self) -> ProtletId {
        self.target
    }
}

impl<F: 'static> Promise<F> {
    /// Returns the promised protlet if `finished` is the one this promise
    /// refers to, `None` otherwise.
    pub fn redeem<'a, I: Identity>(&self, finished: &'a mut Finished<I>) -> Option<&'a mut F>
    where
        F: Protlet<I>,
    {
        if finished.id() == self.target {
            finished.downcast_mut::<F>()
        } else {
            None
        }
    }
}

/// One side effect requested by a handler. The engine interprets these in
/// the order the handler appended them.
pub enum Action<I: Identity> {
    Send(OutgoingMessage<I>),
    Invoke {
        child_id: ProtletId,
        protlet: Box<dyn Protlet<I>>,
        peers: VectorPeerSet<I>,
        promised: bool,
    },
    Complete,
    Await(ProtletId),
    Abort,
}

/// Per-invocation view handed to every handler: the action buffer plus the
/// protlet's own identity, peer set, engine id, and a logger.
pub struct Context<'a, I: Identity> {
    id: ProtletId,
    self_identity: &'a I,
    peers: &'a VectorPeerSet<I>,
    log: &'a Logger,
    next_id: ProtletId,
    actions: Vec<Action<I>>,
}

impl<'a, I: Identity> Context<'a, I> {
    pub(crate) fn new(
        id: ProtletId,
        self_identity: &'a I,
        peers: &'a VectorPeerSet<I>,
        log: &'a Logger,
        next_id: ProtletId,
    ) -> Context<'a, I> {
        Context {
            id,
            self_identity,
            peers,
            log,
            next_id,
            actions: Vec::new(),
        }
    }

    /// This protlet's engine-assigned id.
    pub fn id(&self) -> ProtletId {
        self.id
    }

    /// The identity of the peer this engine runs at.
    pub fn self_identity(&self) -> &'a I {
        self.self_identity
    }

    /// The peers participating in this protlet.
    pub fn peers(&self) -> &'a VectorPeerSet<I> {
        self.peers
    }

    pub fn log(&self) -> &'a Logger {
        self.log
    }

    /// Queue a message to a peer's counterpart of this protlet.
    pub fn send(&mut self, msg: OutgoingMessage<I>) {
        self.actions.push(Action::Send(msg));
    }

    /// Invoke a child protlet over `peers`. Returns the id the child will
    /// carry at this peer.
    pub fn invoke(&mut self, protlet: Box<dyn Protlet<I>>, peers: VectorPeerSet<I>) -> ProtletId {
        let child_id = self.fresh_id();
        self.actions.push(Action::Invoke {
            child_id,
            protlet,
            peers,
            promised: false,
        });
        child_id
    }

    /// Invoke a child as a promise: its completion will not be delivered to
    /// this protlet, but to whoever awaits the returned handle.
    pub fn promise<F: Protlet<I>>(&mut self, protlet: F, peers: VectorPeerSet<I>) -> Promise<F> {
        let child_id = self.fresh_id();
        self.actions.push(Action::Invoke {
            child_id,
            protlet: Box::new(protlet),
            peers,
            promised: true,
        });
        Promise::new(child_id)
    }

    /// Ask to be notified (via `on_promise_done`) when the promised protlet
    /// finishes. A promise may be awaited at most once.
    pub fn await_promise<F>(&mut self, promise: &Promise<F>) {
        self.actions.push(Action::Await(promise.target()));
    }

    /// This protlet is done; once every peer's counterpart reports the same,
    /// the parent (or awaiter) is notified.
    pub fn complete(&mut self) {
        self.actions.push(Action::Complete);
    }

    /// Unrecoverable failure: tear down the run at every peer.
    pub fn abort(&mut self) {
        self.actions.push(Action::Abort);
    }

    pub(crate) fn into_parts(self) -> (Vec<Action<I>>, ProtletId) {
        (self.actions, self.next_id)
    }

    fn fresh_id(&mut self) -> ProtletId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel::logging;

    struct Noop;

    impl Protlet<String> for Noop {
        fn start(&mut self, _ctx: &mut Context<String>) {}
        fn on_message(&mut self, _msg: &mut IncomingMessage<String>, _ctx: &mut Context<String>) {}
        fn on_child_done(&mut self, _child: &mut Finished<String>, _ctx: &mut Context<String>) {}
        fn on_promise_done(&mut self, _p: &mut Finished<String>, _ctx: &mut Context<String>) {}
    }

    struct Other;

    impl Protlet<String> for Other {
        fn start(&mut self, _ctx: &mut Context<String>) {}
        fn on_message(&mut self, _msg: &mut IncomingMessage<String>, _ctx: &mut Context<String>) {}
        fn on_child_done(&mut self, _child: &mut Finished<String>, _ctx: &mut Context<String>) {}
        fn on_promise_done(&mut self, _p: &mut Finished<String>, _ctx: &mut Context<String>) {}
    }

    fn test_peers() -> VectorPeerSet<String> {
        let mut ps = VectorPeerSet::new();
        ps.add("alice".to_owned());
        ps.add("bob".to_owned());
        ps
    }

    #[test]
    fn actions_keep_append_order() {
        let me = "alice".to_owned();
        let peers = test_peers();
        let log = logging::discard();
        let mut ctx = Context::new(7, &me, &peers, &log, 10);

        ctx.send(OutgoingMessage::new("bob".to_owned()));
        let child = ctx.invoke(Box::new(Noop), peers.clone());
        ctx.complete();

        assert_eq!(child, 10);
        let (actions, next) = ctx.into_parts();
        assert_eq!(next, 11);
        assert!(matches!(actions[0], Action::Send(_)));
        assert!(matches!(actions[1], Action::Invoke { child_id: 10, .. }));
        assert!(matches!(actions[2], Action::Complete));
    }

    #[test]
    fn promise_ids_advance_monotonically() {
        let me = "alice".to_owned();
        let peers = test_peers();
        let log = logging::discard();
        let mut ctx = Context::new(1, &me, &peers, &log, 3);

        let p1 = ctx.promise(Noop, peers.clone());
        let p2 = ctx.promise(Noop, peers.clone());
        assert_eq!(p1.target(), 3);
        assert_eq!(p2.target(), 4);
    }

    #[test]
    fn redeem_checks_id_and_type() {
        let mut noop = Noop;
        let mut finished = Finished::new(5, &mut noop);

        let matching: Promise<Noop> = Promise::new(5);
        assert!(matching.redeem::<String>(&mut finished).is_some());

        let wrong_id: Promise<Noop> = Promise::new(6);
        assert!(wrong_id.redeem::<String>(&mut finished).is_none());

        let wrong_type: Promise<Other> = Promise::new(5);
        assert!(wrong_type.redeem::<String>(&mut finished).is_none());
    }
}

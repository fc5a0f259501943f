//! A parent fans out ten children; each child trades one integer with its
//! counterpart. The parent must see exactly ten completions, and the values
//! each side receives must be the values the other side sent.

use braid::prelude::*;
use braid::tester::run_tests;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

const FANOUT: u64 = 10;

type Received = Rc<RefCell<Vec<u64>>>;

struct Trade {
    value: u64,
    received: Received,
}

impl Protlet<String> for Trade {
    fn name(&self) -> &'static str {
        "trade"
    }

    fn start(&mut self, ctx: &mut Context<String>) {
        for peer in ctx.peers().iter() {
            if peer == ctx.self_identity() {
                continue;
            }
            let mut omsg = OutgoingMessage::new(peer.clone());
            omsg.write(&self.value);
            ctx.send(omsg);
        }
    }

    fn on_message(&mut self, msg: &mut IncomingMessage<String>, ctx: &mut Context<String>) {
        self.received.borrow_mut().push(msg.read::<u64>().unwrap());
        ctx.complete();
    }

    fn on_child_done(&mut self, _child: &mut Finished<String>, _ctx: &mut Context<String>) {}
    fn on_promise_done(&mut self, _p: &mut Finished<String>, _ctx: &mut Context<String>) {}
}

struct FanOut {
    base: u64,
    done: u64,
    received: Received,
}

impl Protlet<String> for FanOut {
    fn name(&self) -> &'static str {
        "fan out"
    }

    fn start(&mut self, ctx: &mut Context<String>) {
        for index in 0..FANOUT {
            ctx.invoke(
                Box::new(Trade {
                    value: self.base + index,
                    received: self.received.clone(),
                }),
                ctx.peers().clone(),
            );
        }
    }

    fn on_message(&mut self, _msg: &mut IncomingMessage<String>, _ctx: &mut Context<String>) {}

    fn on_child_done(&mut self, child: &mut Finished<String>, ctx: &mut Context<String>) {
        assert!(child.downcast_mut::<Trade>().is_some());
        self.done += 1;
        if self.done == FANOUT {
            ctx.complete();
        }
    }

    fn on_promise_done(&mut self, _p: &mut Finished<String>, _ctx: &mut Context<String>) {}
}

#[test]
fn ten_children_trade_and_deliver() {
    let at_alice: Received = Rc::new(RefCell::new(Vec::new()));
    let at_bob: Received = Rc::new(RefCell::new(Vec::new()));

    let mut roots: BTreeMap<String, Box<dyn Protlet<String>>> = BTreeMap::new();
    roots.insert(
        "alice".to_owned(),
        Box::new(FanOut {
            base: 100,
            done: 0,
            received: at_alice.clone(),
        }),
    );
    roots.insert(
        "bob".to_owned(),
        Box::new(FanOut {
            base: 200,
            done: 0,
            received: at_bob.clone(),
        }),
    );

    assert!(run_tests(roots));

    // children complete in whatever order the interleaving allows, but the
    // value sets must match exactly
    let mut got_alice = at_alice.borrow().clone();
    let mut got_bob = at_bob.borrow().clone();
    got_alice.sort_unstable();
    got_bob.sort_unstable();
    assert_eq!(got_alice, (200..200 + FANOUT).collect::<Vec<u64>>());
    assert_eq!(got_bob, (100..100 + FANOUT).collect::<Vec<u64>>());
}

#[test]
fn fanout_is_stable_across_interleavings() {
    for seed in [3u64, 17, 99] {
        let at_alice: Received = Rc::new(RefCell::new(Vec::new()));
        let at_bob: Received = Rc::new(RefCell::new(Vec::new()));
        let mut roots: BTreeMap<String, Box<dyn Protlet<String>>> = BTreeMap::new();
        roots.insert(
            "alice".to_owned(),
            Box::new(FanOut {
                base: 1000,
                done: 0,
                received: at_alice.clone(),
            }),
        );
        roots.insert(
            "bob".to_owned(),
            Box::new(FanOut {
                base: 2000,
                done: 0,
                received: at_bob.clone(),
            }),
        );
        assert!(braid::tester::run_tests_seeded(roots, seed));
        assert_eq!(at_alice.borrow().len(), FANOUT as usize);
        assert_eq!(at_bob.borrow().len(), FANOUT as usize);
    }
}

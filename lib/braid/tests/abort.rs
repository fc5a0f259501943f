//! One peer pulls the plug; everybody's run must fail.

use braid::prelude::*;
use braid::tester::run_tests;
use std::collections::BTreeMap;

struct Aborter;

impl Protlet<String> for Aborter {
    fn name(&self) -> &'static str {
        "aborter"
    }

    fn start(&mut self, ctx: &mut Context<String>) {
        for peer in ctx.peers().iter() {
            if peer == ctx.self_identity() {
                continue;
            }
            let mut omsg = OutgoingMessage::new(peer.clone());
            omsg.write(&0u64);
            ctx.send(omsg);
        }
    }

    fn on_message(&mut self, msg: &mut IncomingMessage<String>, ctx: &mut Context<String>) {
        let _ = msg.read::<u64>().unwrap();
        if ctx.self_identity() == "alice" {
            ctx.abort();
        } else {
            ctx.complete();
        }
    }

    fn on_child_done(&mut self, _child: &mut Finished<String>, _ctx: &mut Context<String>) {}
    fn on_promise_done(&mut self, _p: &mut Finished<String>, _ctx: &mut Context<String>) {}
}

#[test]
fn abort_fails_every_peer() {
    let mut roots: BTreeMap<String, Box<dyn Protlet<String>>> = BTreeMap::new();
    roots.insert("alice".to_owned(), Box::new(Aborter));
    roots.insert("bob".to_owned(), Box::new(Aborter));
    assert!(!run_tests(roots));
}

//! The transport stack end to end: two OS threads, one real TCP connection
//! on loopback, a full key exchange over it.

use braid::prelude::*;
use std::cell::Cell;
use std::net::TcpListener as StdListener;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;

const PRIME: u64 = 23;
const BASE: u64 = 5;

fn pow_mod(base: u64, exp: u64, modulus: u64) -> u64 {
    let mut out = 1;
    for _ in 0..exp {
        out = out * base % modulus;
    }
    out
}

struct Exchange {
    secret: u64,
    shared: Rc<Cell<u64>>,
}

impl Protlet<String> for Exchange {
    fn name(&self) -> &'static str {
        "exchange"
    }

    fn start(&mut self, ctx: &mut Context<String>) {
        let public = pow_mod(BASE, self.secret, PRIME);
        for peer in ctx.peers().iter() {
            if peer == ctx.self_identity() {
                continue;
            }
            let mut omsg = OutgoingMessage::new(peer.clone());
            omsg.write(&public);
            ctx.send(omsg);
        }
    }

    fn on_message(&mut self, msg: &mut IncomingMessage<String>, ctx: &mut Context<String>) {
        let received = msg.read::<u64>().unwrap();
        self.shared.set(pow_mod(received, self.secret, PRIME));
        ctx.complete();
    }

    fn on_child_done(&mut self, _child: &mut Finished<String>, _ctx: &mut Context<String>) {}
    fn on_promise_done(&mut self, _p: &mut Finished<String>, _ctx: &mut Context<String>) {}
}

/// Grab a free loopback port from the OS.
fn free_port() -> u16 {
    let listener = StdListener::bind("127.0.0.1:0").expect("loopback bind");
    listener.local_addr().expect("local addr").port()
}

#[test]
fn two_processes_worth_of_threads_agree() {
    // only the lower identity listens, so only its port matters; the higher
    // peer's address is never dialed
    let alice_port = free_port();
    let bob_port = free_port();

    let table = vec![
        (
            "alice".to_owned(),
            format!("127.0.0.1:{}", alice_port).parse().unwrap(),
        ),
        (
            "bob".to_owned(),
            format!("127.0.0.1:{}", bob_port).parse().unwrap(),
        ),
    ];

    let (tx, rx) = mpsc::channel();
    let mut workers = Vec::new();

    for (me, secret) in [("alice", 7u64), ("bob", 11u64)] {
        let table = table.clone();
        let tx = tx.clone();
        workers.push(thread::spawn(move || {
            let peers: Vec<PeerInfo<String>> = table
                .into_iter()
                .map(|(identity, address)| PeerInfo::new(identity, address))
                .collect();
            let shared = Rc::new(Cell::new(u64::MAX));
            let root = Box::new(Exchange {
                secret,
                shared: shared.clone(),
            });
            let log = logging::discard();
            let finished = run_protlet(root, &peers, me.to_owned(), &log);
            tx.send((me.to_owned(), finished, shared.get())).unwrap();
        }));
    }
    drop(tx);

    let mut results = Vec::new();
    while let Ok(result) = rx.recv() {
        results.push(result);
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, finished, _)| *finished));
    assert_eq!(results[0].2, results[1].2);
    assert_eq!(results[0].2, 10);
}

#[test]
fn self_only_run_needs_no_network() {
    struct Instant;

    impl Protlet<String> for Instant {
        fn start(&mut self, ctx: &mut Context<String>) {
            ctx.complete();
        }
        fn on_message(&mut self, _m: &mut IncomingMessage<String>, _c: &mut Context<String>) {}
        fn on_child_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
        fn on_promise_done(&mut self, _f: &mut Finished<String>, _c: &mut Context<String>) {}
    }

    // address is never bound: a run of one opens no sockets
    let peers = vec![PeerInfo::new(
        "alice".to_owned(),
        "127.0.0.1:1".parse().unwrap(),
    )];
    let log = logging::discard();
    assert!(run_protlet(Box::new(Instant), &peers, "alice".to_owned(), &log));
}

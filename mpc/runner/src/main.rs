//! Two-party Diffie-Hellman over real sockets. A CheckField sub-protlet
//! first confirms both sides agree on the field; then each side sends its
//! public value and derives the shared secret.
//!
//! Usage: `dh_demo [--log FILE] <self-identity> (<peer-identity> <ipv4> <port>)*`
//! The peer table must include the local peer; its address is the listen
//! address.

use braid::prelude::*;
use clap::{Arg, Command};
use keel::logging;
use rand::rngs::OsRng;
use rand::Rng;
use std::cell::Cell;
use std::net::{Ipv4Addr, SocketAddr};
use std::process;
use std::rc::Rc;
use std::str::FromStr;

const PRIME: u64 = 23;
const BASE: u64 = 5;

fn pow_mod(base: u64, exp: u64, modulus: u64) -> u64 {
    let mut out = 1;
    for _ in 0..exp {
        out = out * base % modulus;
    }
    out
}

struct CheckField;

impl Protlet<String> for CheckField {
    fn name(&self) -> &'static str {
        "check field"
    }

    fn start(&mut self, ctx: &mut Context<String>) {
        for peer in ctx.peers().iter() {
            if peer == ctx.self_identity() {
                continue;
            }
            let mut omsg = OutgoingMessage::new(peer.clone());
            omsg.write(&PRIME);
            omsg.write(&BASE);
            ctx.send(omsg);
        }
    }

    fn on_message(&mut self, msg: &mut IncomingMessage<String>, ctx: &mut Context<String>) {
        let fields = (msg.read::<u64>(), msg.read::<u64>());
        match fields {
            (Ok(prime), Ok(base)) if prime == PRIME && base == BASE => ctx.complete(),
            _ => {
                logging::error!(ctx.log(), "prime or base does not match"; "context" => "check_field");
                ctx.abort();
            }
        }
    }

    fn on_child_done(&mut self, _child: &mut Finished<String>, ctx: &mut Context<String>) {
        logging::error!(ctx.log(), "check field has no children");
    }

    fn on_promise_done(&mut self, _p: &mut Finished<String>, ctx: &mut Context<String>) {
        logging::error!(ctx.log(), "check field awaits nothing");
    }
}

struct DiffieHellman {
    secret: u64,
    shared: Rc<Cell<u64>>,
}

impl Protlet<String> for DiffieHellman {
    fn name(&self) -> &'static str {
        "diffie hellman"
    }

    fn start(&mut self, ctx: &mut Context<String>) {
        ctx.invoke(Box::new(CheckField), ctx.peers().clone());
        logging::info!(ctx.log(), "using secret"; "secret" => self.secret);
    }

    fn on_child_done(&mut self, _child: &mut Finished<String>, ctx: &mut Context<String>) {
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
        match msg.read::<u64>() {
            Ok(received) => {
                self.shared.set(pow_mod(received, self.secret, PRIME));
                ctx.complete();
            }
            Err(err) => {
                logging::error!(ctx.log(), "unreadable public value"; "error" => %err);
                ctx.abort();
            }
        }
    }

    fn on_promise_done(&mut self, _p: &mut Finished<String>, ctx: &mut Context<String>) {
        logging::error!(ctx.log(), "diffie hellman awaits nothing");
    }
}

fn main() {
    process::exit(run());
}

fn run() -> i32 {
    let matches = match Command::new("dh_demo")
        .about("Diffie-Hellman key exchange over the protlet framework")
        .arg(
            Arg::new("log")
                .long("log")
                .value_name("FILE")
                .help("sloggers TOML logging config"),
        )
        .arg(
            Arg::new("self")
                .required(true)
                .value_name("IDENTITY")
                .help("identity of this peer"),
        )
        .arg(
            Arg::new("peers")
                .num_args(0..)
                .value_name("PEER")
                .help("peer table: identity ipv4 port, repeated; must include this peer"),
        )
        .try_get_matches()
    {
        Ok(matches) => matches,
        Err(err) => {
            let _ = err.print();
            return 1;
        }
    };

    let log = match matches.get_one::<String>("log") {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(toml) => match logging::from_toml(&toml) {
                Ok(log) => log,
                Err(err) => {
                    eprintln!("bad logging config: {}", err);
                    return 1;
                }
            },
            Err(err) => {
                eprintln!("cannot read {}: {}", path, err);
                return 1;
            }
        },
        None => logging::init(),
    };

    let self_identity = match matches.get_one::<String>("self") {
        Some(identity) => identity.clone(),
        None => return 1,
    };

    let raw: Vec<String> = matches
        .get_many::<String>("peers")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if raw.is_empty() || raw.len() % 3 != 0 {
        eprintln!("usage: dh_demo <self-identity> (<peer-identity> <ipv4> <port>)*");
        return 1;
    }

    let mut peers = Vec::new();
    for chunk in raw.chunks(3) {
        let identity = chunk[0].clone();
        let ip = match Ipv4Addr::from_str(&chunk[1]) {
            Ok(ip) => ip,
            Err(_) => {
                eprintln!("invalid address {}", chunk[1]);
                return 2;
            }
        };
        let port = match chunk[2].parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                eprintln!("invalid port {}", chunk[2]);
                return 2;
            }
        };
        peers.push(PeerInfo::new(identity, SocketAddr::from((ip, port))));
    }

    if !peers.iter().any(|p| p.identity == self_identity) {
        eprintln!("peer table must include the local identity {}", self_identity);
        return 1;
    }

    let shared = Rc::new(Cell::new(u64::MAX));
    let secret = OsRng.gen_range(0..=PRIME / 2);
    let root = Box::new(DiffieHellman {
        secret,
        shared: shared.clone(),
    });

    if run_protlet(root, &peers, self_identity, &log) {
        logging::info!(log, "protocol successful"; "shared_secret" => shared.get());
        0
    } else {
        logging::warn!(log, "protocol failed");
        3
    }
}

//! Draw a batch of Beaver triples from a dealer over real sockets. The
//! first identity in the peer table acts as the dealer (override with
//! `--dealer`); everyone else runs a patron and reports how many triples
//! landed in its dispenser.
//!
//! Usage: `beaver_demo [--log FILE] [--dealer IDENTITY] [--count N]
//! [--modulus P] <self-identity> (<peer-identity> <ipv4> <port>)*`

use braid::prelude::*;
use clap::{Arg, Command};
use keel::logging;
use mpccore::beaver::BeaverInfo;
use mpccore::dealer::{RandomnessHouse, RandomnessPatron};
use std::cell::Cell;
use std::net::{Ipv4Addr, SocketAddr};
use std::process;
use std::rc::Rc;
use std::str::FromStr;

struct BeaverRoot {
    dealer: String,
    count: u64,
    modulus: u32,
    drawn: Rc<Cell<usize>>,
    promise: Option<Promise<RandomnessPatron<String, BeaverInfo<u32>>>>,
}

impl Protlet<String> for BeaverRoot {
    fn name(&self) -> &'static str {
        "beaver root"
    }

    fn start(&mut self, ctx: &mut Context<String>) {
        if *ctx.self_identity() == self.dealer {
            ctx.invoke(
                Box::new(RandomnessHouse::<BeaverInfo<u32>>::new()),
                ctx.peers().clone(),
            );
        } else {
            let patron = RandomnessPatron::new(
                self.dealer.clone(),
                self.count,
                BeaverInfo {
                    modulus: self.modulus,
                },
            );
            let promise = ctx.promise(patron, ctx.peers().clone());
            ctx.await_promise(&promise);
            self.promise = Some(promise);
        }
    }

    fn on_message(&mut self, _msg: &mut IncomingMessage<String>, ctx: &mut Context<String>) {
        logging::error!(ctx.log(), "unexpected message at the root");
        ctx.abort();
    }

    fn on_child_done(&mut self, _child: &mut Finished<String>, ctx: &mut Context<String>) {
        logging::info!(ctx.log(), "house finished dealing"; "context" => "root");
        ctx.complete();
    }

    fn on_promise_done(&mut self, finished: &mut Finished<String>, ctx: &mut Context<String>) {
        let promise = match self.promise.as_ref() {
            Some(promise) => promise,
            None => {
                ctx.abort();
                return;
            }
        };
        let patron = match promise.redeem(finished) {
            Some(patron) => patron,
            None => {
                ctx.abort();
                return;
            }
        };

        let mut dispenser = patron.take_dispenser();
        self.drawn.set(dispenser.len());
        if !dispenser.is_empty() {
            let sample = dispenser.get();
            logging::info!(ctx.log(), "first triple share";
                           "context" => "root",
                           "a" => sample.a, "b" => sample.b, "c" => sample.c);
        }
        ctx.complete();
    }
}

fn main() {
    process::exit(run());
}

fn run() -> i32 {
    let matches = match Command::new("beaver_demo")
        .about("Batch Beaver-triple generation through a dealer")
        .arg(Arg::new("log").long("log").value_name("FILE"))
        .arg(Arg::new("dealer").long("dealer").value_name("IDENTITY"))
        .arg(
            Arg::new("count")
                .long("count")
                .value_name("N")
                .default_value("1024"),
        )
        .arg(
            Arg::new("modulus")
                .long("modulus")
                .value_name("P")
                .default_value("97"),
        )
        .arg(Arg::new("self").required(true).value_name("IDENTITY"))
        .arg(
            Arg::new("peers")
                .num_args(0..)
                .value_name("PEER"),
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

    let count = match matches.get_one::<String>("count").map(|c| c.parse::<u64>()) {
        Some(Ok(count)) => count,
        _ => {
            eprintln!("invalid count");
            return 1;
        }
    };
    let modulus = match matches
        .get_one::<String>("modulus")
        .map(|m| m.parse::<u32>())
    {
        Some(Ok(modulus)) if modulus > 1 => modulus,
        _ => {
            eprintln!("invalid modulus");
            return 1;
        }
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
        eprintln!(
            "usage: beaver_demo [--dealer IDENTITY] [--count N] [--modulus P] \
             <self-identity> (<peer-identity> <ipv4> <port>)*"
        );
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

    let dealer = match matches.get_one::<String>("dealer") {
        Some(dealer) => dealer.clone(),
        None => peers[0].identity.clone(),
    };
    if !peers.iter().any(|p| p.identity == dealer) {
        eprintln!("dealer {} is not in the peer table", dealer);
        return 1;
    }

    let drawn = Rc::new(Cell::new(0usize));
    let root = Box::new(BeaverRoot {
        dealer,
        count,
        modulus,
        drawn: drawn.clone(),
        promise: None,
    });

    if run_protlet(root, &peers, self_identity, &log) {
        logging::info!(log, "protocol successful"; "triples" => drawn.get());
        0
    } else {
        logging::warn!(log, "protocol failed");
        3
    }
}

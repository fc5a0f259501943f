//! The dealer pair. One logical protlet spans every peer: at the dealer
//! peer it runs as [`RandomnessHouse`], everywhere else as
//! [`RandomnessPatron`]. Patrons mail the house a descriptor and a count;
//! the house waits for every patron, generates the largest requested count,
//! secret-shares each instance, and streams the shares back in batches. The
//! patron side is a promise: consumers await it and take the dispenser.

use crate::randomness::{RandomnessDispenser, RandomnessInfo};
use braid::message::OutgoingMessage;
use braid::prelude::*;
use keel::logging;
use rand::rngs::OsRng;
use std::mem;

/// Batch payloads stay under the frame payload cap, with room to spare.
const BATCH_BYTES: usize = braid::net::frame::MAX_PAYLOAD_SIZE - 1024;

pub struct RandomnessHouse<Info: RandomnessInfo> {
    info: Option<Info>,
    num_desired: u64,
    num_parties: usize,
    num_received: usize,
}

impl<Info: RandomnessInfo> RandomnessHouse<Info> {
    pub fn new() -> RandomnessHouse<Info> {
        RandomnessHouse {
            info: None,
            num_desired: 0,
            num_parties: 0,
            num_received: 0,
        }
    }

    fn deal<I: Identity>(&mut self, ctx: &mut Context<I>) {
        let info = match &self.info {
            Some(info) => info.clone(),
            None => {
                ctx.abort();
                return;
            }
        };

        let patrons: Vec<I> = ctx
            .peers()
            .iter()
            .filter(|peer| *peer != ctx.self_identity())
            .cloned()
            .collect();

        let total = self.num_desired;
        let batch_size = (BATCH_BYTES / info.instance_size().max(1)).max(1) as u64;

        logging::info!(ctx.log(), "dealing randomness";
                       "context" => "house",
                       "kind" => Info::kind_name(),
                       "instances" => total,
                       "batch_size" => batch_size,
                       "patrons" => patrons.len());

        for patron in &patrons {
            let mut header = OutgoingMessage::new(patron.clone());
            header.write(&total);
            header.write(&batch_size);
            ctx.send(header);
        }

        if total == 0 {
            return;
        }

        let mut rng = OsRng;
        let mut pending: Vec<OutgoingMessage<I>> = patrons
            .iter()
            .map(|patron| OutgoingMessage::new(patron.clone()))
            .collect();
        let mut in_batch = 0u64;

        for _ in 0..total {
            let shares = info.generate(patrons.len(), &mut rng);
            for (slot, share) in shares.iter().enumerate() {
                pending[slot].write(share);
            }
            in_batch += 1;

            if in_batch == batch_size {
                for (slot, patron) in patrons.iter().enumerate() {
                    let full =
                        mem::replace(&mut pending[slot], OutgoingMessage::new(patron.clone()));
                    ctx.send(full);
                }
                in_batch = 0;
            }
        }

        if in_batch > 0 {
            for full in pending {
                ctx.send(full);
            }
        }
    }
}

impl<I: Identity, Info: RandomnessInfo> Protlet<I> for RandomnessHouse<Info> {
    fn name(&self) -> &'static str {
        "randomness house"
    }

    fn start(&mut self, ctx: &mut Context<I>) {
        self.num_parties = ctx.peers().len() - 1;
        if self.num_parties == 0 {
            ctx.complete();
        }
    }

    fn on_message(&mut self, msg: &mut IncomingMessage<I>, ctx: &mut Context<I>) {
        let info = match msg.read::<Info>() {
            Ok(info) => info,
            Err(err) => {
                logging::error!(ctx.log(), "unreadable randomness request";
                                "context" => "house", "error" => %err);
                ctx.abort();
                return;
            }
        };
        let count = match msg.read::<u64>() {
            Ok(count) => count,
            Err(err) => {
                logging::error!(ctx.log(), "unreadable randomness request";
                                "context" => "house", "error" => %err);
                ctx.abort();
                return;
            }
        };

        match &self.info {
            None => self.info = Some(info),
            Some(existing) => {
                if *existing != info {
                    logging::error!(ctx.log(), "peers disagree on randomness parameters";
                                    "context" => "house",
                                    "kind" => Info::kind_name(),
                                    "from" => %msg.sender());
                    ctx.abort();
                    return;
                }
            }
        }

        if self.num_received > 0 && count != self.num_desired {
            logging::warn!(ctx.log(), "peers disagree on instance count, taking the max";
                           "context" => "house",
                           "kind" => Info::kind_name(),
                           "seen" => self.num_desired,
                           "got" => count);
        }
        self.num_desired = self.num_desired.max(count);
        self.num_received += 1;

        if self.num_received == self.num_parties {
            self.deal(ctx);
            ctx.complete();
        }
    }

    fn on_child_done(&mut self, _child: &mut Finished<I>, ctx: &mut Context<I>) {
        logging::error!(ctx.log(), "randomness house has no children"; "context" => "house");
        ctx.abort();
    }

    fn on_promise_done(&mut self, _p: &mut Finished<I>, ctx: &mut Context<I>) {
        logging::error!(ctx.log(), "randomness house awaits nothing"; "context" => "house");
        ctx.abort();
    }
}

pub struct RandomnessPatron<I: Identity, Info: RandomnessInfo> {
    dealer: I,
    num_desired: u64,
    info: Info,
    dispenser: Option<RandomnessDispenser<Info>>,
    expected: u64,
    header_read: bool,
    batches_received: u64,
}

impl<I: Identity, Info: RandomnessInfo> RandomnessPatron<I, Info> {
    pub fn new(dealer: I, num_desired: u64, info: Info) -> RandomnessPatron<I, Info> {
        RandomnessPatron {
            dealer,
            num_desired,
            info,
            dispenser: None,
            expected: 0,
            header_read: false,
            batches_received: 0,
        }
    }

    /// The filled dispenser. Valid once the promise has been delivered;
    /// taking it twice is a bug in the consumer.
    pub fn take_dispenser(&mut self) -> RandomnessDispenser<Info> {
        match self.dispenser.take() {
            Some(dispenser) => dispenser,
            None => panic!("dispenser for {} already taken or never filled", Info::kind_name()),
        }
    }
}

impl<I: Identity, Info: RandomnessInfo> Protlet<I> for RandomnessPatron<I, Info> {
    fn name(&self) -> &'static str {
        "randomness patron"
    }

    fn start(&mut self, ctx: &mut Context<I>) {
        assert!(
            self.dealer != *ctx.self_identity(),
            "the dealer peer runs the house, not a patron"
        );
        if !ctx.peers().has_peer(&self.dealer) {
            logging::error!(ctx.log(), "dealer is not part of this protlet";
                            "context" => "patron", "dealer" => %self.dealer);
            ctx.abort();
            return;
        }

        self.dispenser = Some(RandomnessDispenser::new(self.info.clone()));

        let mut request = OutgoingMessage::new(self.dealer.clone());
        request.write(&self.info);
        request.write(&self.num_desired);
        ctx.send(request);
    }

    fn on_message(&mut self, msg: &mut IncomingMessage<I>, ctx: &mut Context<I>) {
        if msg.sender() != &self.dealer {
            logging::error!(ctx.log(), "randomness from a peer that is not the dealer";
                            "context" => "patron", "from" => %msg.sender());
            ctx.abort();
            return;
        }

        if !self.header_read {
            let total = msg.read::<u64>();
            let batch_size = msg.read::<u64>();
            match (total, batch_size) {
                (Ok(total), Ok(_batch_size)) => {
                    self.header_read = true;
                    self.expected = total;
                    logging::debug!(ctx.log(), "randomness stream announced";
                                    "context" => "patron",
                                    "kind" => Info::kind_name(),
                                    "instances" => total);
                    if total == 0 {
                        ctx.complete();
                    }
                }
                _ => {
                    logging::error!(ctx.log(), "unreadable dealer header"; "context" => "patron");
                    ctx.abort();
                }
            }
            return;
        }

        let dispenser = match self.dispenser.as_mut() {
            Some(dispenser) => dispenser,
            None => {
                ctx.abort();
                return;
            }
        };

        while !msg.is_empty() {
            match msg.read::<Info::Rand>() {
                Ok(instance) => dispenser.insert(instance),
                Err(err) => {
                    logging::error!(ctx.log(), "corrupt randomness batch";
                                    "context" => "patron", "error" => %err);
                    ctx.abort();
                    return;
                }
            }
        }
        self.batches_received += 1;

        if dispenser.len() as u64 > self.expected {
            logging::error!(ctx.log(), "dealer sent more than announced"; "context" => "patron");
            ctx.abort();
            return;
        }

        if dispenser.len() as u64 == self.expected {
            logging::debug!(ctx.log(), "randomness stream complete";
                            "context" => "patron",
                            "kind" => Info::kind_name(),
                            "batches" => self.batches_received);
            ctx.complete();
        }
    }

    fn on_child_done(&mut self, _child: &mut Finished<I>, ctx: &mut Context<I>) {
        logging::error!(ctx.log(), "randomness patron has no children"; "context" => "patron");
        ctx.abort();
    }

    fn on_promise_done(&mut self, _p: &mut Finished<I>, ctx: &mut Context<I>) {
        logging::error!(ctx.log(), "randomness patron awaits nothing"; "context" => "patron");
        ctx.abort();
    }
}

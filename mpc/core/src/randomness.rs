//! Correlated randomness plumbing: the descriptor trait every randomness
//! kind implements, secret-sharing helpers, and the dispenser that hands
//! instances out one at a time.

use crate::numeric::Modular;
use braid::message::{MsgRead, MsgWrite};
use rand::Rng;
use std::collections::VecDeque;
use std::fmt::Debug;

/// Describes one kind of correlated randomness: its parameters, how big one
/// serialized instance is, and how to cut one instance into per-party
/// shares. Peers requesting randomness from a dealer must agree on the
/// descriptor exactly.
pub trait RandomnessInfo: Clone + Eq + Debug + MsgRead + MsgWrite + 'static {
    type Rand: Clone + Debug + MsgRead + MsgWrite + 'static;

    /// Upper bound on the serialized size of one share.
    fn instance_size(&self) -> usize;

    /// Produce one share per non-dealer party for a single fresh instance.
    fn generate<R: Rng>(&self, n_parties: usize, rng: &mut R) -> Vec<Self::Rand>;

    fn kind_name() -> &'static str;
}

/// Split `value` into `n_parties` additive shares mod `modulus`.
pub fn arithmetic_secret_share<N: Modular, R: Rng>(
    n_parties: usize,
    modulus: &N,
    value: &N,
    rng: &mut R,
) -> Vec<N> {
    assert!(n_parties > 0, "cannot share among zero parties");
    let mut shares = Vec::with_capacity(n_parties);
    let mut sum = N::zero();
    for _ in 0..n_parties - 1 {
        let share = N::random_below(modulus, rng);
        sum = sum.add_mod(&share, modulus);
        shares.push(share);
    }
    shares.push(value.sub_mod(&sum, modulus));
    shares
}

/// Sum shares back together mod `modulus`.
pub fn arithmetic_reconstruct<N: Modular>(shares: &[N], modulus: &N) -> N {
    shares
        .iter()
        .fold(N::zero(), |acc, share| acc.add_mod(share, modulus))
}

/// Split a byte into `n_parties` XOR shares.
pub fn xor_secret_share<R: Rng>(n_parties: usize, value: u8, rng: &mut R) -> Vec<u8> {
    assert!(n_parties > 0, "cannot share among zero parties");
    let mut shares = Vec::with_capacity(n_parties);
    let mut acc = 0u8;
    for _ in 0..n_parties - 1 {
        let share: u8 = rng.gen();
        acc ^= share;
        shares.push(share);
    }
    shares.push(value ^ acc);
    shares
}

pub fn xor_reconstruct(shares: &[u8]) -> u8 {
    shares.iter().fold(0, |acc, share| acc ^ share)
}

/// A uniform bit, as a byte in {0, 1}.
pub fn random_bit<R: Rng>(rng: &mut R) -> u8 {
    rng.gen::<bool>() as u8
}

/// FIFO container of randomness instances; hands out one per `get`.
pub struct RandomnessDispenser<Info: RandomnessInfo> {
    info: Info,
    values: VecDeque<Info::Rand>,
}

impl<Info: RandomnessInfo> RandomnessDispenser<Info> {
    pub fn new(info: Info) -> RandomnessDispenser<Info> {
        RandomnessDispenser {
            info,
            values: VecDeque::new(),
        }
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn insert(&mut self, value: Info::Rand) {
        self.values.push_back(value);
    }

    /// Dispense the next instance. Running a dispenser dry is a bug in the
    /// consumer, not a recoverable condition.
    pub fn get(&mut self) -> Info::Rand {
        match self.values.pop_front() {
            Some(value) => value,
            None => panic!("randomness dispenser for {} is empty", Info::kind_name()),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Carve the first `n` instances off into their own dispenser, or `None`
    /// when not enough are left.
    pub fn split_off(&mut self, n: usize) -> Option<RandomnessDispenser<Info>> {
        if n > self.len() {
            return None;
        }
        let mut little = RandomnessDispenser::new(self.info.clone());
        for _ in 0..n {
            let value = self
                .values
                .pop_front()
                .expect("length checked before splitting");
            little.insert(value);
        }
        Some(little)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beaver::BeaverInfo;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn arithmetic_shares_reconstruct() {
        let mut rng = StdRng::seed_from_u64(5);
        let p: u32 = 97;
        for value in [0u32, 1, 42, 96] {
            for parties in 1..5 {
                let shares = arithmetic_secret_share(parties, &p, &value, &mut rng);
                assert_eq!(shares.len(), parties);
                assert_eq!(arithmetic_reconstruct(&shares, &p), value);
            }
        }
    }

    #[test]
    fn xor_shares_reconstruct() {
        let mut rng = StdRng::seed_from_u64(6);
        for value in [0u8, 1, 0xa5, 0xff] {
            for parties in 1..5 {
                let shares = xor_secret_share(parties, value, &mut rng);
                assert_eq!(xor_reconstruct(&shares), value);
            }
        }
    }

    fn dummy_dispenser(count: u32) -> RandomnessDispenser<BeaverInfo<u32>> {
        let mut rng = StdRng::seed_from_u64(7);
        let info = BeaverInfo { modulus: 97 };
        let mut dispenser = RandomnessDispenser::new(info.clone());
        for _ in 0..count {
            let mut shares = info.generate(1, &mut rng);
            dispenser.insert(shares.remove(0));
        }
        dispenser
    }

    #[test]
    fn split_then_drain_equals_plain_drain() {
        let mut whole = dummy_dispenser(10);
        let mut reference = dummy_dispenser(10);

        let mut prefix = whole.split_off(4).unwrap();
        assert_eq!(prefix.len(), 4);
        assert_eq!(whole.len(), 6);

        let mut combined = Vec::new();
        while !prefix.is_empty() {
            combined.push(prefix.get());
        }
        while !whole.is_empty() {
            combined.push(whole.get());
        }

        let mut plain = Vec::new();
        while !reference.is_empty() {
            plain.push(reference.get());
        }

        assert_eq!(combined.len(), plain.len());
        for (a, b) in combined.iter().zip(plain.iter()) {
            assert_eq!(a.a, b.a);
            assert_eq!(a.b, b.b);
            assert_eq!(a.c, b.c);
        }
    }

    #[test]
    fn split_past_end_is_refused() {
        let mut dispenser = dummy_dispenser(3);
        assert!(dispenser.split_off(4).is_none());
        assert_eq!(dispenser.len(), 3);
    }

    #[test]
    #[should_panic(expected = "randomness dispenser for beaver triple is empty")]
    fn empty_get_panics() {
        let mut dispenser = dummy_dispenser(0);
        let _ = dispenser.get();
    }
}

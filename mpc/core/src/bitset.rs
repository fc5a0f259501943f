//! Decomposed bit sets: a uniform r mod a large prime p, additively shared,
//! together with the bits of r shared mod a small prime s (least significant
//! bit first) and the low bit shared once more with XOR. Comparison
//! protocols burn one per compared pair.

use crate::numeric::Modular;
use crate::randomness::{arithmetic_secret_share, xor_secret_share, RandomnessInfo};
use braid::message::{IncomingMessage, MessageError, MsgRead, MsgWrite};
use keel::Identity;
use rand::Rng;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecomposedBitSet<L, S> {
    pub r: L,
    pub bit_shares: Vec<S>,
    pub low_bit: u8,
}

impl<L: MsgWrite, S: MsgWrite> MsgWrite for DecomposedBitSet<L, S> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.r.encode(buf);
        self.bit_shares.encode(buf);
        self.low_bit.encode(buf);
    }
}

impl<L: MsgRead, S: MsgRead> MsgRead for DecomposedBitSet<L, S> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        Ok(DecomposedBitSet {
            r: msg.read()?,
            bit_shares: msg.read()?,
            low_bit: msg.read()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecomposedBitSetInfo<L, S> {
    pub p: L,
    pub s: S,
    /// Bits in the decomposition: ceil(log2 p).
    pub ell: usize,
}

impl<L: MsgWrite, S: MsgWrite> MsgWrite for DecomposedBitSetInfo<L, S> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.p.encode(buf);
        self.s.encode(buf);
        (self.ell as u64).encode(buf);
    }
}

impl<L: MsgRead, S: MsgRead> MsgRead for DecomposedBitSetInfo<L, S> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        let p = msg.read()?;
        let s = msg.read()?;
        let ell = msg.read::<u64>()? as usize;
        Ok(DecomposedBitSetInfo { p, s, ell })
    }
}

impl<L: Modular, S: Modular> RandomnessInfo for DecomposedBitSetInfo<L, S> {
    type Rand = DecomposedBitSet<L, S>;

    fn instance_size(&self) -> usize {
        self.p.number_len() + self.ell * self.s.number_len() + 1 + 8
    }

    fn generate<R: Rng>(&self, n_parties: usize, rng: &mut R) -> Vec<DecomposedBitSet<L, S>> {
        let r = L::random_below(&self.p, rng);

        let r_shares = arithmetic_secret_share(n_parties, &self.p, &r, rng);

        let mut bit_shares: Vec<Vec<S>> = vec![Vec::with_capacity(self.ell); n_parties];
        for index in 0..self.ell {
            let bit = if r.bit(index) { S::one() } else { S::zero() };
            let shares = arithmetic_secret_share(n_parties, &self.s, &bit, rng);
            for (party, share) in shares.into_iter().enumerate() {
                bit_shares[party].push(share);
            }
        }

        let low = if r.bit(0) { 1u8 } else { 0u8 };
        let low_shares = xor_secret_share(n_parties, low, rng);

        r_shares
            .into_iter()
            .zip(bit_shares)
            .zip(low_shares)
            .map(|((r, bit_shares), low_bit)| DecomposedBitSet {
                r,
                bit_shares,
                low_bit,
            })
            .collect()
    }

    fn kind_name() -> &'static str {
        "decomposed bit set"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randomness::{arithmetic_reconstruct, xor_reconstruct};
    use num_bigint::BigUint;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn bits_open_to_the_decomposition_of_r() {
        let mut rng = StdRng::seed_from_u64(61);
        // p = 1009 needs ten bits; s must exceed 1 + ell
        let info = DecomposedBitSetInfo {
            p: 1009u32,
            s: 13u32,
            ell: 10,
        };

        for _ in 0..64 {
            let shares = info.generate(3, &mut rng);
            let rs: Vec<u32> = shares.iter().map(|s| s.r).collect();
            let r = arithmetic_reconstruct(&rs, &info.p);
            assert!(r < info.p);

            for index in 0..info.ell {
                let kth: Vec<u32> = shares.iter().map(|s| s.bit_shares[index]).collect();
                let bit = arithmetic_reconstruct(&kth, &info.s);
                assert_eq!(bit, (r >> index) & 1);
            }

            let lows: Vec<u8> = shares.iter().map(|s| s.low_bit).collect();
            assert_eq!(u32::from(xor_reconstruct(&lows)), r & 1);
        }
    }

    #[test]
    fn works_over_big_integers() {
        let mut rng = StdRng::seed_from_u64(62);
        let p = BigUint::parse_bytes(b"1000003", 10).unwrap();
        let info = DecomposedBitSetInfo {
            p: p.clone(),
            s: 31u32,
            ell: 20,
        };

        let shares = info.generate(2, &mut rng);
        let rs: Vec<BigUint> = shares.iter().map(|s| s.r.clone()).collect();
        let r = arithmetic_reconstruct(&rs, &p);

        for index in 0..info.ell {
            let kth: Vec<u32> = shares.iter().map(|s| s.bit_shares[index]).collect();
            let bit = arithmetic_reconstruct(&kth, &info.s);
            assert_eq!(bit == 1, Modular::bit(&r, index));
        }
    }

    #[test]
    fn codec_roundtrip() {
        let dbs = DecomposedBitSet {
            r: 1000u32,
            bit_shares: vec![3u32, 7, 11],
            low_bit: 1,
        };
        let mut buf = Vec::new();
        dbs.encode(&mut buf);
        let mut imsg = IncomingMessage::new("x".to_owned(), buf);
        assert_eq!(imsg.read::<DecomposedBitSet<u32, u32>>().unwrap(), dbs);
    }
}

//! Beaver triples: shares of (a, b, c) with a·b ≡ c, the workhorse of
//! multiplication under secret sharing. Two flavors: additive shares mod a
//! prime, and XOR shares of an AND triple over bits.

use crate::numeric::Modular;
use crate::randomness::{arithmetic_secret_share, random_bit, xor_secret_share, RandomnessInfo};
use braid::message::{IncomingMessage, MessageError, MsgRead, MsgWrite};
use keel::Identity;
use rand::Rng;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BeaverTriple<N> {
    pub a: N,
    pub b: N,
    pub c: N,
}

impl<N: MsgWrite> MsgWrite for BeaverTriple<N> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.a.encode(buf);
        self.b.encode(buf);
        self.c.encode(buf);
    }
}

impl<N: MsgRead> MsgRead for BeaverTriple<N> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        Ok(BeaverTriple {
            a: msg.read()?,
            b: msg.read()?,
            c: msg.read()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BeaverInfo<N> {
    pub modulus: N,
}

impl<N: MsgWrite> MsgWrite for BeaverInfo<N> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.modulus.encode(buf);
    }
}

impl<N: MsgRead> MsgRead for BeaverInfo<N> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        Ok(BeaverInfo {
            modulus: msg.read()?,
        })
    }
}

impl<N: Modular> RandomnessInfo for BeaverInfo<N> {
    type Rand = BeaverTriple<N>;

    fn instance_size(&self) -> usize {
        3 * self.modulus.number_len()
    }

    fn generate<R: Rng>(&self, n_parties: usize, rng: &mut R) -> Vec<BeaverTriple<N>> {
        let a = N::random_below(&self.modulus, rng);
        let b = N::random_below(&self.modulus, rng);
        let c = a.mul_mod(&b, &self.modulus);

        let sa = arithmetic_secret_share(n_parties, &self.modulus, &a, rng);
        let sb = arithmetic_secret_share(n_parties, &self.modulus, &b, rng);
        let sc = arithmetic_secret_share(n_parties, &self.modulus, &c, rng);

        sa.into_iter()
            .zip(sb)
            .zip(sc)
            .map(|((a, b), c)| BeaverTriple { a, b, c })
            .collect()
    }

    fn kind_name() -> &'static str {
        "beaver triple"
    }
}

/// AND triples over single bits, XOR-shared.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BooleanBeaverInfo;

impl MsgWrite for BooleanBeaverInfo {
    fn encode(&self, _buf: &mut Vec<u8>) {}
}

impl MsgRead for BooleanBeaverInfo {
    fn decode<I: Identity>(_msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        Ok(BooleanBeaverInfo)
    }
}

impl RandomnessInfo for BooleanBeaverInfo {
    type Rand = BeaverTriple<u8>;

    fn instance_size(&self) -> usize {
        3
    }

    fn generate<R: Rng>(&self, n_parties: usize, rng: &mut R) -> Vec<BeaverTriple<u8>> {
        let a = random_bit(rng);
        let b = random_bit(rng);
        let c = a & b;

        let sa = xor_secret_share(n_parties, a, rng);
        let sb = xor_secret_share(n_parties, b, rng);
        let sc = xor_secret_share(n_parties, c, rng);

        sa.into_iter()
            .zip(sb)
            .zip(sc)
            .map(|((a, b), c)| BeaverTriple { a, b, c })
            .collect()
    }

    fn kind_name() -> &'static str {
        "boolean beaver triple"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randomness::{arithmetic_reconstruct, xor_reconstruct};
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn arithmetic_triples_satisfy_the_relation() {
        let mut rng = ChaCha12Rng::seed_from_u64(21);
        let info = BeaverInfo { modulus: 97u32 };
        for parties in 1..5 {
            for _ in 0..128 {
                let shares = info.generate(parties, &mut rng);
                assert_eq!(shares.len(), parties);
                let a: Vec<u32> = shares.iter().map(|s| s.a).collect();
                let b: Vec<u32> = shares.iter().map(|s| s.b).collect();
                let c: Vec<u32> = shares.iter().map(|s| s.c).collect();
                let a = arithmetic_reconstruct(&a, &97);
                let b = arithmetic_reconstruct(&b, &97);
                let c = arithmetic_reconstruct(&c, &97);
                assert_eq!(a * b % 97, c);
            }
        }
    }

    #[test]
    fn boolean_triples_satisfy_the_relation() {
        let mut rng = ChaCha12Rng::seed_from_u64(22);
        for _ in 0..256 {
            let shares = BooleanBeaverInfo.generate(3, &mut rng);
            let a: Vec<u8> = shares.iter().map(|s| s.a).collect();
            let b: Vec<u8> = shares.iter().map(|s| s.b).collect();
            let c: Vec<u8> = shares.iter().map(|s| s.c).collect();
            assert_eq!(xor_reconstruct(&a) & xor_reconstruct(&b), xor_reconstruct(&c));
        }
    }

    #[test]
    fn triple_codec_roundtrip() {
        let triple = BeaverTriple {
            a: 5u32,
            b: 10,
            c: 50,
        };
        let mut buf = Vec::new();
        triple.encode(&mut buf);
        let mut imsg = IncomingMessage::new("x".to_owned(), buf);
        assert_eq!(imsg.read::<BeaverTriple<u32>>().unwrap(), triple);
    }

    #[test]
    fn info_equality_is_modulus_equality() {
        assert_eq!(BeaverInfo { modulus: 97u32 }, BeaverInfo { modulus: 97u32 });
        assert_ne!(BeaverInfo { modulus: 97u32 }, BeaverInfo { modulus: 31u32 });
    }
}

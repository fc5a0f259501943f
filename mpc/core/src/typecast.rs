//! Type-cast triples bridge arithmetic and boolean sharing: (r0, r1, r2) is
//! (1, 0, 0) or (p−1, 1, 1) with equal probability, r0 and r1 shared mod p,
//! r2 shared with XOR.

use crate::numeric::Modular;
use crate::randomness::{
    arithmetic_secret_share, random_bit, xor_secret_share, RandomnessInfo,
};
use braid::message::{IncomingMessage, MessageError, MsgRead, MsgWrite};
use keel::Identity;
use rand::Rng;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeCastTriple<N> {
    pub r_0: N,
    pub r_1: N,
    pub r_2: u8,
}

impl<N: MsgWrite> MsgWrite for TypeCastTriple<N> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.r_0.encode(buf);
        self.r_1.encode(buf);
        self.r_2.encode(buf);
    }
}

impl<N: MsgRead> MsgRead for TypeCastTriple<N> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        Ok(TypeCastTriple {
            r_0: msg.read()?,
            r_1: msg.read()?,
            r_2: msg.read()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeCastInfo<N> {
    pub modulus: N,
}

impl<N: MsgWrite> MsgWrite for TypeCastInfo<N> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.modulus.encode(buf);
    }
}

impl<N: MsgRead> MsgRead for TypeCastInfo<N> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        Ok(TypeCastInfo {
            modulus: msg.read()?,
        })
    }
}

impl<N: Modular> RandomnessInfo for TypeCastInfo<N> {
    type Rand = TypeCastTriple<N>;

    fn instance_size(&self) -> usize {
        2 * self.modulus.number_len() + 1
    }

    fn generate<R: Rng>(&self, n_parties: usize, rng: &mut R) -> Vec<TypeCastTriple<N>> {
        let flip = random_bit(rng);
        let (r_0, r_1, r_2) = if flip == 0 {
            (N::one(), N::zero(), 0u8)
        } else {
            (N::zero().sub_mod(&N::one(), &self.modulus), N::one(), 1u8)
        };

        let s0 = arithmetic_secret_share(n_parties, &self.modulus, &r_0, rng);
        let s1 = arithmetic_secret_share(n_parties, &self.modulus, &r_1, rng);
        let s2 = xor_secret_share(n_parties, r_2, rng);

        s0.into_iter()
            .zip(s1)
            .zip(s2)
            .map(|((r_0, r_1), r_2)| TypeCastTriple { r_0, r_1, r_2 })
            .collect()
    }

    fn kind_name() -> &'static str {
        "type cast triple"
    }
}

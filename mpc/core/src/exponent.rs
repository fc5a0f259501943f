//! Exponent series: shares of (r⁰, r¹, …, r^ell) for a uniform nonzero r.
//! Consumed by fan-in-or style protocols that evaluate polynomials in a
//! hidden random point.

use crate::numeric::Modular;
use crate::randomness::{arithmetic_secret_share, RandomnessInfo};
use braid::message::{IncomingMessage, MessageError, MsgRead, MsgWrite};
use keel::Identity;
use rand::Rng;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExponentSeries<N>(pub Vec<N>);

impl<N: MsgWrite> MsgWrite for ExponentSeries<N> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.0.encode(buf);
    }
}

impl<N: MsgRead> MsgRead for ExponentSeries<N> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        Ok(ExponentSeries(msg.read()?))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExponentSeriesInfo<N> {
    pub modulus: N,
    pub ell: usize,
}

impl<N: MsgWrite> MsgWrite for ExponentSeriesInfo<N> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.modulus.encode(buf);
        (self.ell as u64).encode(buf);
    }
}

impl<N: MsgRead> MsgRead for ExponentSeriesInfo<N> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        let modulus = msg.read()?;
        let ell = msg.read::<u64>()? as usize;
        Ok(ExponentSeriesInfo { modulus, ell })
    }
}

impl<N: Modular> RandomnessInfo for ExponentSeriesInfo<N> {
    type Rand = ExponentSeries<N>;

    fn instance_size(&self) -> usize {
        (self.ell + 1) * self.modulus.number_len() + 8
    }

    fn generate<R: Rng>(&self, n_parties: usize, rng: &mut R) -> Vec<ExponentSeries<N>> {
        let mut r = N::random_below(&self.modulus, rng);
        while r == N::zero() {
            r = N::random_below(&self.modulus, rng);
        }

        let mut power = N::one();
        let mut per_party: Vec<Vec<N>> = vec![Vec::with_capacity(self.ell + 1); n_parties];
        for _ in 0..=self.ell {
            let shares = arithmetic_secret_share(n_parties, &self.modulus, &power, rng);
            for (party, share) in shares.into_iter().enumerate() {
                per_party[party].push(share);
            }
            power = power.mul_mod(&r, &self.modulus);
        }

        per_party.into_iter().map(ExponentSeries).collect()
    }

    fn kind_name() -> &'static str {
        "exponent series"
    }
}

//! Control bits for a Waksman permutation network. Each switch gate gets
//! one uniform bit, handed out in three sharings at once: arithmetic mod the
//! value modulus, arithmetic mod the key modulus, and XOR. All three open to
//! the same bit, gate by gate.

use crate::numeric::Modular;
use crate::randomness::{
    arithmetic_secret_share, random_bit, xor_secret_share, RandomnessInfo,
};
use braid::message::{IncomingMessage, MessageError, MsgRead, MsgWrite};
use keel::Identity;
use rand::Rng;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WaksmanBits<N> {
    pub arithmetic_bit_shares: Vec<N>,
    pub key_bit_shares: Vec<N>,
    pub xor_bit_shares: Vec<u8>,
}

impl<N: MsgWrite> MsgWrite for WaksmanBits<N> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.arithmetic_bit_shares.encode(buf);
        self.key_bit_shares.encode(buf);
        self.xor_bit_shares.encode(buf);
    }
}

impl<N: MsgRead> MsgRead for WaksmanBits<N> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        Ok(WaksmanBits {
            arithmetic_bit_shares: msg.read()?,
            key_bit_shares: msg.read()?,
            xor_bit_shares: msg.read()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WaksmanInfo<N> {
    pub modulus: N,
    pub key_modulus: N,
    /// Switch gates in the network.
    pub gates: usize,
}

impl<N: MsgWrite> MsgWrite for WaksmanInfo<N> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.modulus.encode(buf);
        self.key_modulus.encode(buf);
        (self.gates as u64).encode(buf);
    }
}

impl<N: MsgRead> MsgRead for WaksmanInfo<N> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError> {
        let modulus = msg.read()?;
        let key_modulus = msg.read()?;
        let gates = msg.read::<u64>()? as usize;
        Ok(WaksmanInfo {
            modulus,
            key_modulus,
            gates,
        })
    }
}

impl<N: Modular> RandomnessInfo for WaksmanInfo<N> {
    type Rand = WaksmanBits<N>;

    fn instance_size(&self) -> usize {
        self.gates * (self.modulus.number_len() + self.key_modulus.number_len() + 1) + 24
    }

    fn generate<R: Rng>(&self, n_parties: usize, rng: &mut R) -> Vec<WaksmanBits<N>> {
        let mut out: Vec<WaksmanBits<N>> = (0..n_parties)
            .map(|_| WaksmanBits {
                arithmetic_bit_shares: Vec::with_capacity(self.gates),
                key_bit_shares: Vec::with_capacity(self.gates),
                xor_bit_shares: Vec::with_capacity(self.gates),
            })
            .collect();

        for _ in 0..self.gates {
            let bit = random_bit(rng);
            let as_number = if bit == 1 { N::one() } else { N::zero() };

            let arith = arithmetic_secret_share(n_parties, &self.modulus, &as_number, rng);
            let keyed = arithmetic_secret_share(n_parties, &self.key_modulus, &as_number, rng);
            let xored = xor_secret_share(n_parties, bit, rng);

            for (party, ((a, k), x)) in arith
                .into_iter()
                .zip(keyed)
                .zip(xored)
                .enumerate()
            {
                out[party].arithmetic_bit_shares.push(a);
                out[party].key_bit_shares.push(k);
                out[party].xor_bit_shares.push(x);
            }
        }

        out
    }

    fn kind_name() -> &'static str {
        "waksman bits"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randomness::{arithmetic_reconstruct, xor_reconstruct};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn all_three_sharings_open_to_the_same_bit() {
        let mut rng = StdRng::seed_from_u64(51);
        let info = WaksmanInfo {
            modulus: 97u32,
            key_modulus: 31u32,
            gates: 24,
        };

        for _ in 0..32 {
            let shares = info.generate(3, &mut rng);
            for gate in 0..info.gates {
                let arith: Vec<u32> =
                    shares.iter().map(|s| s.arithmetic_bit_shares[gate]).collect();
                let keyed: Vec<u32> = shares.iter().map(|s| s.key_bit_shares[gate]).collect();
                let xored: Vec<u8> = shares.iter().map(|s| s.xor_bit_shares[gate]).collect();

                let bit = arithmetic_reconstruct(&arith, &97);
                assert!(bit == 0 || bit == 1);
                assert_eq!(arithmetic_reconstruct(&keyed, &31), bit);
                assert_eq!(u32::from(xor_reconstruct(&xored)), bit);
            }
        }
    }

    #[test]
    fn codec_roundtrip() {
        let bits = WaksmanBits {
            arithmetic_bit_shares: vec![1u32, 0, 96],
            key_bit_shares: vec![4u32, 5, 6],
            xor_bit_shares: vec![1, 0, 1],
        };
        let mut buf = Vec::new();
        bits.encode(&mut buf);
        let mut imsg = IncomingMessage::new("x".to_owned(), buf);
        assert_eq!(imsg.read::<WaksmanBits<u32>>().unwrap(), bits);
    }
}

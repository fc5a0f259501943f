//! Modular arithmetic over the number types shares are built from: machine
//! words for small fields, `BigUint` for large ones.

use braid::message::{MsgRead, MsgWrite};
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::Rng;
use std::fmt::Debug;

pub trait Modular: Clone + Eq + Ord + Debug + MsgRead + MsgWrite + 'static {
    fn zero() -> Self;
    fn one() -> Self;
    fn add_mod(&self, other: &Self, modulus: &Self) -> Self;
    fn sub_mod(&self, other: &Self, modulus: &Self) -> Self;
    fn mul_mod(&self, other: &Self, modulus: &Self) -> Self;

    /// Uniform value in `[0, modulus)`.
    fn random_below<R: Rng>(modulus: &Self, rng: &mut R) -> Self;

    /// Bit `index` of the value, least significant first.
    fn bit(&self, index: usize) -> bool;

    /// Serialized size in bytes, used to size dealer batches.
    fn number_len(&self) -> usize;
}

impl Modular for u32 {
    fn zero() -> u32 {
        0
    }

    fn one() -> u32 {
        1
    }

    fn add_mod(&self, other: &u32, modulus: &u32) -> u32 {
        ((u64::from(*self) + u64::from(*other)) % u64::from(*modulus)) as u32
    }

    fn sub_mod(&self, other: &u32, modulus: &u32) -> u32 {
        ((u64::from(*self) + u64::from(*modulus) - u64::from(*other)) % u64::from(*modulus)) as u32
    }

    fn mul_mod(&self, other: &u32, modulus: &u32) -> u32 {
        ((u64::from(*self) * u64::from(*other)) % u64::from(*modulus)) as u32
    }

    fn random_below<R: Rng>(modulus: &u32, rng: &mut R) -> u32 {
        rng.gen_range(0..*modulus)
    }

    fn bit(&self, index: usize) -> bool {
        index < 32 && (self >> index) & 1 == 1
    }

    fn number_len(&self) -> usize {
        4
    }
}

impl Modular for u64 {
    fn zero() -> u64 {
        0
    }

    fn one() -> u64 {
        1
    }

    fn add_mod(&self, other: &u64, modulus: &u64) -> u64 {
        ((u128::from(*self) + u128::from(*other)) % u128::from(*modulus)) as u64
    }

    fn sub_mod(&self, other: &u64, modulus: &u64) -> u64 {
        ((u128::from(*self) + u128::from(*modulus) - u128::from(*other)) % u128::from(*modulus))
            as u64
    }

    fn mul_mod(&self, other: &u64, modulus: &u64) -> u64 {
        ((u128::from(*self) * u128::from(*other)) % u128::from(*modulus)) as u64
    }

    fn random_below<R: Rng>(modulus: &u64, rng: &mut R) -> u64 {
        rng.gen_range(0..*modulus)
    }

    fn bit(&self, index: usize) -> bool {
        index < 64 && (self >> index) & 1 == 1
    }

    fn number_len(&self) -> usize {
        8
    }
}

impl Modular for BigUint {
    fn zero() -> BigUint {
        Zero::zero()
    }

    fn one() -> BigUint {
        One::one()
    }

    fn add_mod(&self, other: &BigUint, modulus: &BigUint) -> BigUint {
        (self + other) % modulus
    }

    fn sub_mod(&self, other: &BigUint, modulus: &BigUint) -> BigUint {
        ((self + modulus) - other) % modulus
    }

    fn mul_mod(&self, other: &BigUint, modulus: &BigUint) -> BigUint {
        (self * other) % modulus
    }

    fn random_below<R: Rng>(modulus: &BigUint, rng: &mut R) -> BigUint {
        rng.gen_biguint_below(modulus)
    }

    fn bit(&self, index: usize) -> bool {
        BigUint::bit(self, index as u64)
    }

    fn number_len(&self) -> usize {
        2 + (self.bits() as usize + 7) / 8
    }
}

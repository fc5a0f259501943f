#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod beaver;
pub mod bitset;
pub mod dealer;
pub mod exponent;
pub mod numeric;
pub mod randomness;
pub mod typecast;
pub mod waksman;

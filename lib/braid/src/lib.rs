#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod engine;
pub mod message;
pub mod net;
pub mod peerset;
pub mod prelude;
pub mod protlet;
pub mod tester;

pub mod rng;
pub mod utf8;

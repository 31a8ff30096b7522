pub mod accumulator;
pub mod circuit;
pub mod events;
pub mod payload;
pub mod proof;

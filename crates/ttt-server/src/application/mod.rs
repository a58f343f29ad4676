//! Application layer: the authoritative game-state synchronizer.

pub mod synchronizer;

pub use synchronizer::ServerSynchronizer;

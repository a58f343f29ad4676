//! Application layer: the mirrored game state and menu derivation.

pub mod synchronizer;

pub use synchronizer::{
    format_board, format_possible_moves, ClientSynchronizer, SharedClientState,
};

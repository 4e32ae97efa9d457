//! Nearest-neighbor index over digests.

pub mod ball_tree;

pub use ball_tree::{BallTree, DEFAULT_LEAF_SIZE};

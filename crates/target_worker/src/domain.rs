mod target_committer;

pub use target_committer::*;

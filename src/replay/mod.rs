//! Playback of saved recordings

mod engine;

pub use engine::{not_found_output, PlaybackResolver};

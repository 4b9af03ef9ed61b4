//! Jukebox - record/replay engine for HTTP mocks
//!
//! Requests are recorded once against their real destinations, saved as YAML
//! recordings grouped into albums, and played back deterministically afterwards.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod client;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod matching;
pub mod message;
pub mod network;
pub mod proxy;
pub mod recording;
pub mod replay;
pub mod storage;

pub use error::{JukeboxError, Result};

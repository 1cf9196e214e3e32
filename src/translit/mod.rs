//! Clipboard transliteration: capture the selection, rewrite it, paste it back

mod chord;
mod engine;
mod special;

pub use engine::{Engine, RequestOutcome};

// src/watch/mod.rs

//! Completion watching.
//!
//! The transformer that produces derived artifacts is triggered by the
//! staging area itself, so the pipeline never calls it. The only way to know
//! it finished is to poll for its output; this module does that with a
//! bounded, cancellable loop.

pub mod watcher;

pub use watcher::{CompletionWatcher, Found, PollState, WatchConfig, WatchError, WatchTarget};

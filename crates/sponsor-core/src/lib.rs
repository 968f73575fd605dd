//! Core types, repository traits and the name-matching engine for sponsor
//! reconciliation.
//!
//! This crate is deliberately free of database and runtime dependencies.
//! Storage backends implement the traits in [`store`]; the reconciliation job
//! drives the pure functions in [`normalize`], [`variant`], [`similarity`],
//! [`index`] and [`matcher`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod index;
pub mod matcher;
pub mod memory;
pub mod normalize;
pub mod record;
pub mod similarity;
pub mod store;
pub mod variant;

pub use error::{Error, Result};

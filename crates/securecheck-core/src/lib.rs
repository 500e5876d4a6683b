//! Core types, store traits, and the detection engine for SecureCheck.
//!
//! This crate has no HTTP or database dependencies. Rules are pure functions
//! over stop-record snapshots; the detection pass drives them against any
//! backend implementing [`store::StopStore`] and [`store::FlagStore`].

// Store impls use `async fn`; the trait signatures carry the `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod config;
pub mod detect;
pub mod error;
pub mod flag;
pub mod insight;
pub mod rules;
pub mod stop;
pub mod store;

pub use error::{Error, Result};

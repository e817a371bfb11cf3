//! PharmacyStock API Library
//!
//! Core engine for batch-level pharmacy inventory: FEFO dispensing,
//! expiry tracking, an append-only stock-movement ledger and alerting.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod actor;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

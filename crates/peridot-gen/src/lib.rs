//! # peridot-gen: the generator contract the oracles consume
//!
//! The random SQL generator itself lives outside the oracle engine; this
//! crate pins down everything the oracles are allowed to ask of it:
//!
//! - [`BuildConstraints`]: the per-oracle restrictions a query build must
//!   honor (require a WHERE, forbid aggregates, minimum join width, ...);
//! - [`BuildReason`]: the closed taxonomy of reasons a build can fail,
//!   which oracles translate into skip reasons;
//! - [`QueryGenerator`]: the trait with the build/predicate/DML entry
//!   points;
//! - the fuzzer configuration types ([`FuzzConfig`], [`Features`],
//!   [`Adaptive`]) oracles read their knobs from.

mod config;
mod constraints;
mod generator;
mod reason;

pub use config::{Adaptive, Features, FuzzConfig, OracleConfig, PredicateLevel};
pub use constraints::BuildConstraints;
pub use generator::{PredicateGuard, QueryGenerator};
pub use reason::{BuildError, BuildReason};

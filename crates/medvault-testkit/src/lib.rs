//! # medvault-testkit
//!
//! Testing utilities for medvault.
//!
//! ## Generators
//!
//! Proptest strategies for addresses, record keys, wrap schemes, record
//! documents and random grant/revoke histories.
//!
//! ## Fixtures
//!
//! A [`TestWorld`] of shared in-memory collaborators and any number of
//! [`Party`] sessions on top of it, each with their own keyring and cache.
//!
//! ## Faults
//!
//! Wrappers that make the signing agent, content store or registry fail,
//! stall, or race a concurrent writer.

pub mod faults;
pub mod fixtures;
pub mod generators;

pub use faults::{FaultyAgent, FaultyRegistry, FaultyStore, FaultyVault, Faults};
pub use fixtures::{address, secret, ClinicFixture, Party, TestWorld, WorldVault};
pub use generators::*;

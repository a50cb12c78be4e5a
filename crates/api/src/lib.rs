#![deny(missing_docs)]
//! SeqGate API contains the gateway collaborator traits and the basic types
//! required to define the api of those traits.
//!
//! A SeqGate deployment is one process serving sequence-data requests out of
//! a local read-only cache tier with an asynchronous database tier behind
//! it. The pipeline that drives a single request lives in the seqgate_core
//! crate; everything the pipeline needs from the outside world (cache
//! lookups, database reads, the client transport, metrics counters) is a
//! trait defined here, so hosts can wire in their own implementations.

mod error;
pub use error::*;

pub mod bioseq;
pub use bioseq::*;

pub mod blob;
pub use blob::*;

pub mod annot;
pub use annot::*;

pub mod request;
pub use request::*;

pub mod keyspace;
pub use keyspace::*;

pub mod protocol;

pub mod builder;
pub mod cache;
pub mod config;
pub mod counters;
pub mod db;
pub mod transport;

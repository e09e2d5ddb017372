//! Genome representation shared by candidates, species and the wire format.
//!
//! Genes are an opaque, serializable mapping. The core never interprets
//! them; [`Species`](crate::population::Species) implementations and
//! evaluators do.
//!
//! # Submodules
//!
//! - [`params`]: extra evaluator parameters that survive the JSON round trip
//! - [`operators`]: bit-string mutation and pursuit operators
//! - [`bitstring`]: [`BitStringSpecies`], the stage-wise binary encoding used
//!   by Genetic CNN style architecture search

pub mod bitstring;
pub mod operators;
pub mod params;

pub use bitstring::BitStringSpecies;
pub use params::{ParamValue, Parameters};

use std::collections::BTreeMap;

/// Named genes of one candidate.
pub type Genes = BTreeMap<String, serde_json::Value>;

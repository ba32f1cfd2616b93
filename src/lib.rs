//! Acorn: a multi-layer, design-rule-aware autorouter core.
//!
//! Given a discretized 3-D cell grid, a netlist of single-ended nets and
//! differential pairs, design-rule sets, and a handful of geometric
//! zones (keep-out, pin-swap, cost), the iteration controller in
//! [`controller`] drives repeated rounds of path search, differential-pair
//! synthesis, design-rule checking, and congestion-based rip-up-and-reroute
//! until the routing is design-rule clean or the iteration budget runs out.

pub mod collections;
pub mod congestion;
pub mod context;
pub mod contiguous;
pub mod controller;
pub mod design_rules;
pub mod diffpair;
pub mod drc;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod metrics;
pub mod net;
pub mod pathfinder;

pub use error::{Error, Result};

//! # Liga Core Library
//!
//! Determination of 3-D atomic structures from an unordered set of pair
//! distances, by the competitive "liga" tournament of partial structures.
//!
//! ## Architectural Philosophy
//!
//! The library keeps a strict three-layer split:
//!
//! - **[`core`]: The Foundation.**  Stateless data models
//!   (`DistanceTable`, `Atom`, `Lattice`), the pure triangulation
//!   geometry, and the text formats (distance files, XYZ, AtomEye).
//!
//! - **[`engine`]: The Logic Core.**  The stateful search machinery:
//!   pair-cost evaluators with incremental bookkeeping, the `Molecule`
//!   and `Crystal` structures, least-squares atom relaxation, and the
//!   division tournament scheduler (`Liga`).
//!
//! - **[`workflows`]: The Public API.**  `workflows::solve::run` ties a
//!   target table, a configuration and a progress reporter into one
//!   complete search.

pub mod core;
pub mod engine;
pub mod workflows;

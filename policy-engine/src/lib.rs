// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A BGP route-policy evaluation engine.
//!
//! Given a path (an NLRI plus its attributes), the engine decides whether
//! to accept, reject, or transform it according to operator-defined
//! policies built from:
//!
//! - Defined sets: named, typed collections (prefix trees, network
//!   lists, AS-path and community pattern sets).
//! - Statements: AND'd conditions over those sets, mod-actions that
//!   rewrite attributes, and an optional terminal accept/reject.
//! - Policies: ordered statement lists.
//! - Assignments: ordered policy lists per direction with a fall-through
//!   default.
//!
//! The engine is library code: evaluation is synchronous, CPU-bound, and
//! free of I/O. Driving sessions, exchanging messages, best-path
//! selection, and RIB storage all live elsewhere.

pub mod action;
pub mod attrs;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod path;
pub mod policy;
pub mod sets;

pub use engine::{PatchEntity, PatchOp, PolicyEngine, GLOBAL_RIB_NAME};
pub use error::Error;
pub use path::{Path, PeerInfo};
pub use policy::{Direction, Disposition, PolicyOptions, Verdict};

//! Type definitions for Strata.
//!
//! Identifier newtypes shared by every storage and execution component.

mod ids;

pub use ids::{CommitId, Oid, SlotId, TupleLocation, TxnId};

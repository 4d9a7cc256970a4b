//! # strata-common
//!
//! Common types, errors, and memory primitives for Strata.
//!
//! This crate provides the foundations shared by the storage, executor and
//! logging crates:
//!
//! - **Types**: Identifiers (`Oid`, `TxnId`, `CommitId`, `SlotId`) and tuple locations
//! - **Errors**: Unified error handling with `StrataError`
//! - **Config**: Storage configuration loaded from TOML
//! - **Memory**: The `Backend` allocation contract and the `Pool` arena for
//!   variable-length column data
//! - **Constants**: System-wide constants and limits
//!
//! ## Example
//!
//! ```rust
//! use strata_common::types::{CommitId, SlotId, TxnId};
//! use strata_common::error::StrataResult;
//!
//! fn example() -> StrataResult<()> {
//!     let txn = TxnId::new(7);
//!     let slot = SlotId::new(3);
//!     assert!(txn.is_valid());
//!     assert!(CommitId::new(10) < CommitId::INFINITY);
//!     assert_eq!(slot.as_usize(), 3);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod memory;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::StorageConfig;
pub use error::{ErrorCode, StrataError, StrataResult};
pub use memory::{Backend, HeapBackend, Pool, PoolRef};
pub use types::{CommitId, Oid, SlotId, TupleLocation, TxnId};

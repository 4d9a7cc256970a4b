//! Memory management for Strata.
//!
//! - **Backend**: the allocate/free contract every tile's storage goes through
//! - **Pool**: a chunked bump arena holding variable-length ("uninlined")
//!   column values referenced from fixed-width slot storage
//!
//! # Design Principles
//!
//! 1. **Injected allocation**: tiles never call the global allocator directly
//! 2. **Accounting**: backends track outstanding bytes and may enforce a limit
//! 3. **Single writer**: a pool is mutated through `&mut self`; the owning tile
//!    serializes writers with a lock

mod backend;
mod pool;

pub use backend::{Backend, HeapBackend};
pub use pool::{Pool, PoolRef};

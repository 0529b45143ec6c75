//! Transactional ledger core
//!
//! PostgreSQL-backed accounts, entries and transfers with a deadlock-free
//! transfer path.
//!
//! # Layers
//!
//! ```text
//! caller ─▶ Store::transfer_tx ─▶ PgStore::exec_tx ─▶ Queries ─▶ PostgreSQL
//!           (orchestrator)        (coordinator)       (data access)
//! ```
//!
//! # Invariants
//!
//! 1. **All-or-nothing**: a transfer's row, both entries and both balance
//!    updates commit together or not at all
//! 2. **Balanced entries**: the two entries of a transfer sum to zero
//! 3. **Global lock order**: account rows are always locked lowest id first
//! 4. **No cache**: every read goes to the store inside a transaction or a
//!    single-statement connection checkout

pub mod coordinator;
pub mod error;
pub mod models;
pub mod queries;
pub mod store;
pub mod transfer_tx;
pub mod user_tx;

pub use error::{ConflictKind, ErrorKind, LedgerError};
pub use models::*;
pub use queries::Queries;
pub use store::{AfterCreate, PgStore, Querier, Store};
pub use user_tx::{enqueue_verify_email, no_side_effects};

//! bank_ledger - Transactional funds-transfer engine
//!
//! Records transfers between accounts as one transfer row plus two balancing
//! entries, updating both balances atomically on PostgreSQL.
//!
//! # Modules
//!
//! - [`ledger`] - Data access, transaction coordinator, transfer and user workflows
//! - [`outbox`] - Durable side-effect outbox and its background drainer
//! - [`db`] - Connection pool and schema bootstrap
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - tracing subscriber setup
//! - [`fixtures`] - Seeded random data generators

pub mod config;
pub mod db;
pub mod fixtures;
pub mod ledger;
pub mod logging;
pub mod outbox;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use db::Database;
pub use ledger::{
    Account, Currency, Entry, ErrorKind, LedgerError, PgStore, Querier, Store, Transfer,
    TransferTxParams, TransferTxResult,
};
pub use outbox::{OutboxTask, OutboxWorker, TaskDistributor};

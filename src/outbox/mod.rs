//! Durable task outbox
//!
//! Side effects of a ledger write (e.g. "send the verification email") are
//! stored as rows in `task_outbox` inside the same transaction as the write.
//! [`OutboxWorker`] delivers committed rows to a [`TaskDistributor`] later.
//!
//! ```text
//! create_user_tx ── INSERT users + INSERT task_outbox ── COMMIT
//!                                                          │
//! OutboxWorker ◀── SELECT .. FOR UPDATE SKIP LOCKED ───────┘
//!      │
//!      └─▶ TaskDistributor::distribute ─▶ dispatched_at = NOW()
//! ```

pub mod distributor;
pub mod task;
pub mod worker;

pub use distributor::{LogDistributor, TaskDistributor};
pub use task::{
    OutboxTask, PayloadSendVerifyEmail, PendingTask, QUEUE_CRITICAL, QUEUE_DEFAULT,
    TASK_SEND_VERIFY_EMAIL,
};
pub use worker::{DrainReport, OutboxWorker, WorkerConfig};

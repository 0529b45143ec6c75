//! Store capability traits and the PostgreSQL implementation
//!
//! [`Querier`] is the plain CRUD surface, [`Store`] adds the transactional
//! workflows. [`PgStore`] owns the connection pool; every CRUD call checks out
//! one connection for its duration and every workflow runs inside
//! [`PgStore::exec_tx`].

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::error::LedgerError;
use super::models::*;
use super::queries::Queries;
use super::{transfer_tx, user_tx};
use crate::outbox::OutboxTask;

/// Side-effect hook run inside `create_user_tx` after the user row is written.
///
/// It returns the tasks to persist in the outbox; nothing leaves the process
/// until the transaction commits. An error rolls back the user row.
pub type AfterCreate = Box<dyn FnOnce(&User) -> Result<Vec<OutboxTask>, LedgerError> + Send>;

/// Plain data access, one statement per call
#[async_trait]
pub trait Querier: Send + Sync {
    async fn create_account(&self, arg: CreateAccountParams) -> Result<Account, LedgerError>;
    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError>;
    async fn list_accounts(&self, arg: ListAccountsParams) -> Result<Vec<Account>, LedgerError>;
    async fn update_account(&self, id: AccountId, balance: i64) -> Result<Account, LedgerError>;
    async fn add_account_balance(&self, id: AccountId, amount: i64) -> Result<Account, LedgerError>;
    async fn delete_account(&self, id: AccountId) -> Result<(), LedgerError>;

    async fn create_entry(&self, arg: CreateEntryParams) -> Result<Entry, LedgerError>;
    async fn get_entry(&self, id: EntryId) -> Result<Entry, LedgerError>;
    async fn list_entries(&self, arg: ListEntriesParams) -> Result<Vec<Entry>, LedgerError>;

    async fn create_transfer(&self, arg: CreateTransferParams) -> Result<Transfer, LedgerError>;
    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, LedgerError>;
    async fn list_transfers(&self, arg: ListTransfersParams) -> Result<Vec<Transfer>, LedgerError>;
    async fn list_transfers_by_account(
        &self,
        arg: ListTransfersByAccountParams,
    ) -> Result<Vec<Transfer>, LedgerError>;

    async fn create_user(&self, arg: CreateUserParams) -> Result<User, LedgerError>;
    async fn get_user(&self, username: &str) -> Result<User, LedgerError>;
    async fn update_user(&self, arg: UpdateUserParams) -> Result<User, LedgerError>;

    async fn create_session(&self, arg: CreateSessionParams) -> Result<Session, LedgerError>;
    async fn get_session(&self, id: Uuid) -> Result<Session, LedgerError>;
    async fn block_session(&self, id: Uuid) -> Result<Session, LedgerError>;
    async fn delete_expired_sessions(&self) -> Result<u64, LedgerError>;

    async fn create_verify_email(&self, arg: CreateVerifyEmailParams) -> Result<VerifyEmail, LedgerError>;
}

/// Data access plus the multi-statement transactional workflows
#[async_trait]
pub trait Store: Querier {
    /// Move `amount` between two accounts: one transfer row, two entries,
    /// two balance updates, all or nothing.
    async fn transfer_tx(&self, arg: TransferTxParams) -> Result<TransferTxResult, LedgerError>;

    async fn create_user_tx(
        &self,
        arg: CreateUserParams,
        after_create: AfterCreate,
    ) -> Result<CreateUserTxResult, LedgerError>;

    async fn verify_user_email_tx(
        &self,
        arg: VerifyUserEmailTxParams,
    ) -> Result<VerifyUserEmailTxResult, LedgerError>;
}

/// PostgreSQL-backed [`Store`]
#[derive(Clone)]
pub struct PgStore {
    pub(super) pool: PgPool,
    pub(super) statement_timeout: Option<Duration>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: None,
        }
    }

    /// Bound every statement issued inside `exec_tx`; a statement past the
    /// deadline fails with a transient error and the transaction rolls back.
    /// A zero duration leaves statements unbounded.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Querier for PgStore {
    async fn create_account(&self, arg: CreateAccountParams) -> Result<Account, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).create_account(&arg).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).get_account(id).await
    }

    async fn list_accounts(&self, arg: ListAccountsParams) -> Result<Vec<Account>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).list_accounts(&arg).await
    }

    async fn update_account(&self, id: AccountId, balance: i64) -> Result<Account, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).update_account(id, balance).await
    }

    async fn add_account_balance(&self, id: AccountId, amount: i64) -> Result<Account, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).add_account_balance(id, amount).await
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).delete_account(id).await
    }

    async fn create_entry(&self, arg: CreateEntryParams) -> Result<Entry, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).create_entry(arg).await
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).get_entry(id).await
    }

    async fn list_entries(&self, arg: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).list_entries(arg).await
    }

    async fn create_transfer(&self, arg: CreateTransferParams) -> Result<Transfer, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).create_transfer(arg).await
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).get_transfer(id).await
    }

    async fn list_transfers(&self, arg: ListTransfersParams) -> Result<Vec<Transfer>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).list_transfers(arg).await
    }

    async fn list_transfers_by_account(
        &self,
        arg: ListTransfersByAccountParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).list_transfers_by_account(arg).await
    }

    async fn create_user(&self, arg: CreateUserParams) -> Result<User, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).create_user(&arg).await
    }

    async fn get_user(&self, username: &str) -> Result<User, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).get_user(username).await
    }

    async fn update_user(&self, arg: UpdateUserParams) -> Result<User, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).update_user(&arg).await
    }

    async fn create_session(&self, arg: CreateSessionParams) -> Result<Session, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).create_session(&arg).await
    }

    async fn get_session(&self, id: Uuid) -> Result<Session, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).get_session(id).await
    }

    async fn block_session(&self, id: Uuid) -> Result<Session, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).block_session(id).await
    }

    async fn delete_expired_sessions(&self) -> Result<u64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).delete_expired_sessions().await
    }

    async fn create_verify_email(&self, arg: CreateVerifyEmailParams) -> Result<VerifyEmail, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).create_verify_email(&arg).await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn transfer_tx(&self, arg: TransferTxParams) -> Result<TransferTxResult, LedgerError> {
        transfer_tx::execute(self, arg).await
    }

    async fn create_user_tx(
        &self,
        arg: CreateUserParams,
        after_create: AfterCreate,
    ) -> Result<CreateUserTxResult, LedgerError> {
        user_tx::create_user(self, arg, after_create).await
    }

    async fn verify_user_email_tx(
        &self,
        arg: VerifyUserEmailTxParams,
    ) -> Result<VerifyUserEmailTxResult, LedgerError> {
        user_tx::verify_email(self, arg).await
    }
}

//! Ledger Data Access
//!
//! Parameterized queries against the ledger tables. No business logic lives
//! here. A [`Queries`] borrows exactly one connection, which is either a pooled
//! connection or an open transaction, so the same code runs inside and outside
//! a transaction boundary.

use sqlx::PgConnection;
use uuid::Uuid;

use super::error::LedgerError;
use super::models::*;
use crate::outbox::{OutboxTask, PendingTask};

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";
const USER_COLUMNS: &str =
    "username, hashed_password, full_name, email, is_email_verified, password_changed_at, created_at";
const SESSION_COLUMNS: &str =
    "id, username, refresh_token, user_agent, client_ip, is_blocked, expires_at, created_at";
const VERIFY_EMAIL_COLUMNS: &str =
    "id, username, email, secret_code, is_used, created_at, expired_at";

/// Typed queries bound to a single connection or transaction
pub struct Queries<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> Queries<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    pub async fn create_account(&mut self, arg: &CreateAccountParams) -> Result<Account, LedgerError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "INSERT INTO accounts (owner, balance, currency) VALUES ($1, $2, $3) RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&arg.owner)
        .bind(arg.balance)
        .bind(arg.currency.as_str())
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(account)
    }

    pub async fn get_account(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "account" })
    }

    /// Read an account and hold its row lock until the transaction ends.
    ///
    /// `FOR NO KEY UPDATE` keeps the key share locks taken by foreign keys on
    /// `entries`/`transfers` compatible with the balance update.
    pub async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1 FOR NO KEY UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "account" })
    }

    pub async fn list_accounts(&mut self, arg: &ListAccountsParams) -> Result<Vec<Account>, LedgerError> {
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner = $1 ORDER BY id LIMIT $2 OFFSET $3"
        ))
        .bind(&arg.owner)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(accounts)
    }

    /// Administrative balance overwrite
    pub async fn update_account(&mut self, id: AccountId, balance: i64) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET balance = $2 WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id)
        .bind(balance)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "account" })
    }

    /// Apply a signed delta to the balance and return the updated row
    pub async fn add_account_balance(&mut self, id: AccountId, amount: i64) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET balance = balance + $2 WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "account" })
    }

    pub async fn delete_account(&mut self, id: AccountId) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound { entity: "account" });
        }
        Ok(())
    }

    // ========================================================================
    // Entries
    // ========================================================================

    pub async fn create_entry(&mut self, arg: CreateEntryParams) -> Result<Entry, LedgerError> {
        let entry = sqlx::query_as::<_, Entry>(&format!(
            "INSERT INTO entries (account_id, amount) VALUES ($1, $2) RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(arg.account_id)
        .bind(arg.amount)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(entry)
    }

    pub async fn get_entry(&mut self, id: EntryId) -> Result<Entry, LedgerError> {
        sqlx::query_as::<_, Entry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "entry" })
    }

    pub async fn list_entries(&mut self, arg: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        let entries = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE account_id = $1 ORDER BY id LIMIT $2 OFFSET $3"
        ))
        .bind(arg.account_id)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(entries)
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    pub async fn create_transfer(&mut self, arg: CreateTransferParams) -> Result<Transfer, LedgerError> {
        let transfer = sqlx::query_as::<_, Transfer>(&format!(
            "INSERT INTO transfers (from_account_id, to_account_id, amount) VALUES ($1, $2, $3) \
             RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(arg.from_account_id)
        .bind(arg.to_account_id)
        .bind(arg.amount)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(transfer)
    }

    pub async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer, LedgerError> {
        sqlx::query_as::<_, Transfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "transfer" })
    }

    pub async fn list_transfers(&mut self, arg: ListTransfersParams) -> Result<Vec<Transfer>, LedgerError> {
        let transfers = sqlx::query_as::<_, Transfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers \
             WHERE from_account_id = $1 AND to_account_id = $2 \
             ORDER BY id LIMIT $3 OFFSET $4"
        ))
        .bind(arg.from_account_id)
        .bind(arg.to_account_id)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(transfers)
    }

    pub async fn list_transfers_by_account(
        &mut self,
        arg: ListTransfersByAccountParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let transfers = sqlx::query_as::<_, Transfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers \
             WHERE from_account_id = $1 OR to_account_id = $1 \
             ORDER BY id LIMIT $2 OFFSET $3"
        ))
        .bind(arg.account_id)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(transfers)
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn create_user(&mut self, arg: &CreateUserParams) -> Result<User, LedgerError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, hashed_password, full_name, email) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&arg.username)
        .bind(&arg.hashed_password)
        .bind(&arg.full_name)
        .bind(&arg.email)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(user)
    }

    pub async fn get_user(&mut self, username: &str) -> Result<User, LedgerError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 LIMIT 1"
        ))
        .bind(username)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "user" })
    }

    pub async fn update_user(&mut self, arg: &UpdateUserParams) -> Result<User, LedgerError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                hashed_password = COALESCE($2, hashed_password), \
                password_changed_at = COALESCE($3, password_changed_at), \
                full_name = COALESCE($4, full_name), \
                email = COALESCE($5, email), \
                is_email_verified = COALESCE($6, is_email_verified) \
             WHERE username = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&arg.username)
        .bind(arg.hashed_password.as_deref())
        .bind(arg.password_changed_at)
        .bind(arg.full_name.as_deref())
        .bind(arg.email.as_deref())
        .bind(arg.is_email_verified)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "user" })
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub async fn create_session(&mut self, arg: &CreateSessionParams) -> Result<Session, LedgerError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "INSERT INTO sessions (id, username, refresh_token, user_agent, client_ip, is_blocked, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(arg.id)
        .bind(&arg.username)
        .bind(&arg.refresh_token)
        .bind(&arg.user_agent)
        .bind(&arg.client_ip)
        .bind(arg.is_blocked)
        .bind(arg.expires_at)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(session)
    }

    pub async fn get_session(&mut self, id: Uuid) -> Result<Session, LedgerError> {
        sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "session" })
    }

    pub async fn block_session(&mut self, id: Uuid) -> Result<Session, LedgerError> {
        sqlx::query_as::<_, Session>(&format!(
            "UPDATE sessions SET is_blocked = TRUE WHERE id = $1 RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "session" })
    }

    /// Returns the number of sessions removed
    pub async fn delete_expired_sessions(&mut self) -> Result<u64, LedgerError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < NOW()")
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected())
    }

    // ========================================================================
    // Email verification
    // ========================================================================

    pub async fn create_verify_email(
        &mut self,
        arg: &CreateVerifyEmailParams,
    ) -> Result<VerifyEmail, LedgerError> {
        let verify_email = sqlx::query_as::<_, VerifyEmail>(&format!(
            "INSERT INTO verify_emails (username, email, secret_code) VALUES ($1, $2, $3) \
             RETURNING {VERIFY_EMAIL_COLUMNS}"
        ))
        .bind(&arg.username)
        .bind(&arg.email)
        .bind(&arg.secret_code)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(verify_email)
    }

    /// Mark a verification row used. Matches only an unused, unexpired row
    /// with the same secret code.
    pub async fn update_verify_email(
        &mut self,
        id: i64,
        secret_code: &str,
    ) -> Result<VerifyEmail, LedgerError> {
        sqlx::query_as::<_, VerifyEmail>(&format!(
            "UPDATE verify_emails SET is_used = TRUE \
             WHERE id = $1 AND secret_code = $2 AND is_used = FALSE AND expired_at > NOW() \
             RETURNING {VERIFY_EMAIL_COLUMNS}"
        ))
        .bind(id)
        .bind(secret_code)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(LedgerError::NotFound { entity: "verify_email" })
    }

    // ========================================================================
    // Task outbox
    // ========================================================================

    pub async fn enqueue_task(&mut self, task: &OutboxTask) -> Result<i64, LedgerError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO task_outbox (task_type, queue, payload) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&task.task_type)
        .bind(&task.queue)
        .bind(&task.payload)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(id)
    }

    /// Lock undelivered tasks. Rows held by another drainer are skipped.
    pub async fn fetch_pending_tasks(
        &mut self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<PendingTask>, LedgerError> {
        let tasks = sqlx::query_as::<_, PendingTask>(
            "SELECT id, task_type, queue, payload, attempts, last_error, created_at \
             FROM task_outbox \
             WHERE dispatched_at IS NULL AND attempts < $2 \
             ORDER BY id LIMIT $1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(tasks)
    }

    pub async fn mark_task_dispatched(&mut self, id: i64) -> Result<(), LedgerError> {
        sqlx::query("UPDATE task_outbox SET dispatched_at = NOW(), attempts = attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn record_task_failure(&mut self, id: i64, error: &str) -> Result<(), LedgerError> {
        sqlx::query("UPDATE task_outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

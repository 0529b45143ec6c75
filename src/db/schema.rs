//! Ledger schema bootstrap for tests and local development.
//!
//! Every statement is idempotent; production schemas are managed by the
//! deployment's own migration tooling.

use sqlx::PgPool;

pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    username            VARCHAR PRIMARY KEY,
    hashed_password     VARCHAR NOT NULL,
    full_name           VARCHAR NOT NULL,
    email               VARCHAR UNIQUE NOT NULL,
    is_email_verified   BOOLEAN NOT NULL DEFAULT FALSE,
    password_changed_at TIMESTAMPTZ NOT NULL DEFAULT '0001-01-01 00:00:00Z',
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id         BIGSERIAL PRIMARY KEY,
    owner      VARCHAR NOT NULL,
    balance    BIGINT NOT NULL,
    currency   VARCHAR NOT NULL CHECK (currency IN ('USD', 'EUR', 'CAD', 'VND')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id         BIGSERIAL PRIMARY KEY,
    account_id BIGINT NOT NULL REFERENCES accounts (id),
    amount     BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
    id              BIGSERIAL PRIMARY KEY,
    from_account_id BIGINT NOT NULL REFERENCES accounts (id),
    to_account_id   BIGINT NOT NULL REFERENCES accounts (id),
    amount          BIGINT NOT NULL CHECK (amount > 0),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id            UUID PRIMARY KEY,
    username      VARCHAR NOT NULL REFERENCES users (username),
    refresh_token VARCHAR NOT NULL,
    user_agent    VARCHAR NOT NULL,
    client_ip     VARCHAR NOT NULL,
    is_blocked    BOOLEAN NOT NULL DEFAULT FALSE,
    expires_at    TIMESTAMPTZ NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_VERIFY_EMAILS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS verify_emails (
    id          BIGSERIAL PRIMARY KEY,
    username    VARCHAR NOT NULL REFERENCES users (username),
    email       VARCHAR NOT NULL,
    secret_code VARCHAR NOT NULL,
    is_used     BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    expired_at  TIMESTAMPTZ NOT NULL DEFAULT (NOW() + INTERVAL '15 minutes')
)
"#;

pub const CREATE_TASK_OUTBOX_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS task_outbox (
    id            BIGSERIAL PRIMARY KEY,
    task_type     VARCHAR NOT NULL,
    queue         VARCHAR NOT NULL,
    payload       TEXT NOT NULL,
    attempts      INT NOT NULL DEFAULT 0,
    last_error    TEXT,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    dispatched_at TIMESTAMPTZ
)
"#;

pub const CREATE_INDEXES: [&str; 6] = [
    "CREATE INDEX IF NOT EXISTS accounts_owner_idx ON accounts (owner)",
    "CREATE UNIQUE INDEX IF NOT EXISTS accounts_owner_currency_key ON accounts (owner, currency)",
    "CREATE INDEX IF NOT EXISTS entries_account_id_idx ON entries (account_id)",
    "CREATE INDEX IF NOT EXISTS transfers_from_to_idx ON transfers (from_account_id, to_account_id)",
    "CREATE INDEX IF NOT EXISTS transfers_to_account_id_idx ON transfers (to_account_id)",
    "CREATE INDEX IF NOT EXISTS task_outbox_pending_idx ON task_outbox (id) WHERE dispatched_at IS NULL",
];

/// Tables in dependency order
pub const TABLES: [(&str, &str); 7] = [
    ("users", CREATE_USERS_TABLE),
    ("accounts", CREATE_ACCOUNTS_TABLE),
    ("entries", CREATE_ENTRIES_TABLE),
    ("transfers", CREATE_TRANSFERS_TABLE),
    ("sessions", CREATE_SESSIONS_TABLE),
    ("verify_emails", CREATE_VERIFY_EMAILS_TABLE),
    ("task_outbox", CREATE_TASK_OUTBOX_TABLE),
];

/// Create all ledger tables and indexes if missing
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Ensuring ledger schema...");

    // Concurrent callers (parallel test binaries) race on CREATE IF NOT EXISTS
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock(7294061)")
        .execute(&mut *tx)
        .await?;

    for (name, ddl) in TABLES {
        sqlx::query(ddl).execute(&mut *tx).await.map_err(|e| {
            tracing::error!(table = name, error = %e, "Failed to create table");
            e
        })?;
    }

    for ddl in CREATE_INDEXES {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    tracing::info!("Ledger schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_idempotent() {
        for (name, ddl) in TABLES {
            assert!(
                ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {name}")),
                "{name} must be created idempotently"
            );
        }
        for ddl in CREATE_INDEXES {
            assert!(ddl.contains("IF NOT EXISTS"));
        }
    }

    #[test]
    fn test_referenced_tables_come_first() {
        let position = |table: &str| TABLES.iter().position(|(n, _)| *n == table).unwrap();
        assert!(position("accounts") < position("entries"));
        assert!(position("accounts") < position("transfers"));
        assert!(position("users") < position("sessions"));
        assert!(position("users") < position("verify_emails"));
    }
}

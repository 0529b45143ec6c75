//! Shared helpers for the PostgreSQL integration tests.
//!
//! Point `DATABASE_URL` at a disposable database and run with
//! `cargo test -- --ignored`.

#![allow(dead_code)]

use sqlx::postgres::PgPoolOptions;

use bank_ledger::config::{DATABASE_URL_ENV, DatabaseConfig};
use bank_ledger::db::schema;
use bank_ledger::fixtures::RandomGen;
use bank_ledger::ledger::{
    Account, CreateAccountParams, CreateUserParams, Currency, PgStore, Querier, User,
};

pub async fn setup_store() -> PgStore {
    let url = std::env::var(DATABASE_URL_ENV).unwrap_or_else(|_| DatabaseConfig::default().url);
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .expect("Failed to connect to PostgreSQL");
    schema::ensure_schema(&pool)
        .await
        .expect("Failed to prepare schema");
    PgStore::new(pool)
}

pub async fn create_account(store: &PgStore, balance: i64, currency: Currency) -> Account {
    let mut rng = RandomGen::from_entropy();
    let arg = CreateAccountParams {
        owner: rng.owner(),
        balance,
        currency,
    };

    let account = store.create_account(arg.clone()).await.expect("create account");

    assert_eq!(account.owner, arg.owner);
    assert_eq!(account.balance, arg.balance);
    assert_eq!(account.currency, arg.currency);
    assert!(account.id > 0);
    account
}

pub async fn create_random_account(store: &PgStore, rng: &mut RandomGen) -> Account {
    let balance = rng.money();
    let currency = rng.currency();
    create_account(store, balance, currency).await
}

pub fn random_user_params(rng: &mut RandomGen) -> CreateUserParams {
    CreateUserParams {
        username: rng.owner(),
        hashed_password: format!("$argon2id$v=19${}", rng.password()),
        full_name: rng.owner(),
        email: rng.email(),
    }
}

pub async fn create_random_user(store: &PgStore, rng: &mut RandomGen) -> User {
    let arg = random_user_params(rng);
    let user = store.create_user(arg.clone()).await.expect("create user");

    assert_eq!(user.username, arg.username);
    assert_eq!(user.email, arg.email);
    assert!(!user.is_email_verified);
    user
}

pub async fn count_transfers_touching(store: &PgStore, account_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transfers WHERE from_account_id = $1 OR to_account_id = $1")
        .bind(account_id)
        .fetch_one(store.pool())
        .await
        .expect("count transfers")
}

pub async fn count_entries(store: &PgStore, account_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE account_id = $1")
        .bind(account_id)
        .fetch_one(store.pool())
        .await
        .expect("count entries")
}

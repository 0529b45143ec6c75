//! Ledger data model
//!
//! Row types for the six ledger tables plus the parameter and result structs
//! used by the query layer and the transactional workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type AccountId = i64;
pub type EntryId = i64;
pub type TransferId = i64;

// ============================================================================
// Currency
// ============================================================================

/// Supported account currencies. Stored as upper-case TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Cad,
    Vnd,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Currency::Usd, Currency::Eur, Currency::Cad, Currency::Vnd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Cad => "CAD",
            Currency::Vnd => "VND",
        }
    }

    /// Whether `code` names a supported currency
    pub fn is_supported(code: &str) -> bool {
        code.parse::<Currency>().is_ok()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported currency: {0}")]
pub struct UnsupportedCurrency(pub String);

impl FromStr for Currency {
    type Err = UnsupportedCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "CAD" => Ok(Currency::Cad),
            "VND" => Ok(Currency::Vnd),
            other => Err(UnsupportedCurrency(other.to_string())),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = UnsupportedCurrency;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Balance is in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub balance: i64,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

/// Signed ledger line: negative debits, positive credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
    pub is_email_verified: bool,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub username: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VerifyEmail {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub secret_code: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreateAccountParams {
    pub owner: String,
    pub balance: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone)]
pub struct ListAccountsParams {
    pub owner: String,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CreateEntryParams {
    pub account_id: AccountId,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct ListEntriesParams {
    pub account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CreateTransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
}

/// Transfers for one directed account pair
#[derive(Debug, Clone, Copy)]
pub struct ListTransfersParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

/// Transfers where the account is either side
#[derive(Debug, Clone, Copy)]
pub struct ListTransfersByAccountParams {
    pub account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
}

/// Partial update: `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserParams {
    pub username: String,
    pub hashed_password: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub is_email_verified: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub id: Uuid,
    pub username: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateVerifyEmailParams {
    pub username: String,
    pub email: String,
    pub secret_code: String,
}

// ============================================================================
// Transactional workflow params / results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_entry: Entry,
    pub to_entry: Entry,
    pub from_account: Account,
    pub to_account: Account,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateUserTxResult {
    pub user: User,
    /// Outbox rows written alongside the user
    pub enqueued_tasks: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct VerifyUserEmailTxParams {
    pub email_id: i64,
    pub secret_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyUserEmailTxResult {
    pub user: User,
    pub verify_email: VerifyEmail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_round_trips_through_text() {
        for currency in Currency::ALL {
            assert_eq!(currency.as_str().parse::<Currency>(), Ok(currency));
            assert_eq!(Currency::try_from(currency.to_string()), Ok(currency));
        }
    }

    #[test]
    fn test_currency_rejects_unknown_code() {
        assert!(!Currency::is_supported("BTC"));
        assert!(!Currency::is_supported("usd")); // codes are upper-case
        assert!(Currency::is_supported("VND"));
        assert_eq!(
            "GBP".parse::<Currency>(),
            Err(UnsupportedCurrency("GBP".to_string()))
        );
    }

    #[test]
    fn test_currency_serde_uses_iso_code() {
        let json = serde_json::to_string(&Currency::Cad).unwrap();
        assert_eq!(json, "\"CAD\"");
        let back: Currency = serde_json::from_str("\"EUR\"").unwrap();
        assert_eq!(back, Currency::Eur);
    }

    #[test]
    fn test_user_serialization_hides_password_hash() {
        let now = Utc::now();
        let user = User {
            username: "alice".into(),
            hashed_password: "$argon2id$secret".into(),
            full_name: "Alice".into(),
            email: "alice@example.com".into(),
            is_email_verified: false,
            password_changed_at: now,
            created_at: now,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("hashed_password").is_none());
        assert_eq!(json["username"], "alice");
    }
}

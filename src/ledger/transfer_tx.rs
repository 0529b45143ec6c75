//! Transfer Orchestrator
//!
//! Moves funds between two accounts inside one transaction:
//!
//! 1. lock both account rows, lowest id first, and check currency and funds
//! 2. insert the transfer row
//! 3. insert the debit entry (`-amount`) and the credit entry (`+amount`)
//! 4. apply both balance deltas, lowest id first
//!
//! # Lock ordering
//!
//! Two transfers running A→B and B→A at the same time would deadlock if each
//! locked its own "from" account first. Every row lock here is taken in
//! ascending account id order regardless of direction, so all concurrent
//! transfers queue on the same first lock and no wait cycle can form.

use tracing::info;

use super::error::LedgerError;
use super::models::{
    Account, AccountId, CreateEntryParams, CreateTransferParams, TransferTxParams,
    TransferTxResult,
};
use super::queries::Queries;
use super::store::PgStore;

impl TransferTxParams {
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: i64) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// Checks that need no database access
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.from_account_id == self.to_account_id {
            return Err(LedgerError::SameAccount);
        }
        Ok(())
    }

    /// Signed balance deltas in lock order (ascending account id)
    pub fn balance_updates(&self) -> [(AccountId, i64); 2] {
        let debit = (self.from_account_id, -self.amount);
        let credit = (self.to_account_id, self.amount);
        if self.from_account_id < self.to_account_id {
            [debit, credit]
        } else {
            [credit, debit]
        }
    }
}

pub(super) async fn execute(
    store: &PgStore,
    arg: TransferTxParams,
) -> Result<TransferTxResult, LedgerError> {
    arg.validate()?;

    let result = store
        .exec_tx(move |q| Box::pin(async move { transfer(q, arg).await }))
        .await?;

    info!(
        transfer_id = result.transfer.id,
        from_account_id = arg.from_account_id,
        to_account_id = arg.to_account_id,
        amount = arg.amount,
        "Transfer committed"
    );

    Ok(result)
}

async fn transfer(q: &mut Queries<'_>, arg: TransferTxParams) -> Result<TransferTxResult, LedgerError> {
    let (from_account, to_account) = lock_accounts(q, &arg).await?;
    check_transfer(&arg, &from_account, &to_account)?;

    let transfer = q
        .create_transfer(CreateTransferParams {
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            amount: arg.amount,
        })
        .await?;

    let from_entry = q
        .create_entry(CreateEntryParams {
            account_id: arg.from_account_id,
            amount: -arg.amount,
        })
        .await?;

    let to_entry = q
        .create_entry(CreateEntryParams {
            account_id: arg.to_account_id,
            amount: arg.amount,
        })
        .await?;

    let [(first_id, first_delta), (second_id, second_delta)] = arg.balance_updates();
    let first = q.add_account_balance(first_id, first_delta).await?;
    let second = q.add_account_balance(second_id, second_delta).await?;

    let (from_account, to_account) = if first.id == arg.from_account_id {
        (first, second)
    } else {
        (second, first)
    };

    Ok(TransferTxResult {
        transfer,
        from_entry,
        to_entry,
        from_account,
        to_account,
    })
}

/// Lock both rows in ascending id order; returns (from, to)
async fn lock_accounts(
    q: &mut Queries<'_>,
    arg: &TransferTxParams,
) -> Result<(Account, Account), LedgerError> {
    if arg.from_account_id < arg.to_account_id {
        let from = q.get_account_for_update(arg.from_account_id).await?;
        let to = q.get_account_for_update(arg.to_account_id).await?;
        Ok((from, to))
    } else {
        let to = q.get_account_for_update(arg.to_account_id).await?;
        let from = q.get_account_for_update(arg.from_account_id).await?;
        Ok((from, to))
    }
}

fn check_transfer(arg: &TransferTxParams, from: &Account, to: &Account) -> Result<(), LedgerError> {
    if from.currency != to.currency {
        return Err(LedgerError::CurrencyMismatch {
            account_id: to.id,
            expected: from.currency.to_string(),
            actual: to.currency.to_string(),
        });
    }
    if from.balance < arg.amount {
        return Err(LedgerError::InsufficientBalance {
            account_id: from.id,
            balance: from.balance,
            required: arg.amount,
        });
    }
    if to.balance.checked_add(arg.amount).is_none() {
        return Err(LedgerError::BalanceOverflow { account_id: to.id });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::Currency;
    use chrono::Utc;

    fn account(id: AccountId, balance: i64, currency: Currency) -> Account {
        Account {
            id,
            owner: format!("owner{id}"),
            balance,
            currency,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_rejects_non_positive_amount() {
        assert!(matches!(
            TransferTxParams::new(1, 2, 0).validate(),
            Err(LedgerError::InvalidAmount)
        ));
        assert!(matches!(
            TransferTxParams::new(1, 2, -5).validate(),
            Err(LedgerError::InvalidAmount)
        ));
        assert!(TransferTxParams::new(1, 2, 1).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_self_transfer() {
        assert!(matches!(
            TransferTxParams::new(3, 3, 10).validate(),
            Err(LedgerError::SameAccount)
        ));
    }

    #[test]
    fn test_balance_updates_follow_ascending_id_in_both_directions() {
        // A→B and B→A must request locks in the same order
        let forward = TransferTxParams::new(1, 2, 30).balance_updates();
        let backward = TransferTxParams::new(2, 1, 30).balance_updates();

        assert_eq!(forward, [(1, -30), (2, 30)]);
        assert_eq!(backward, [(1, 30), (2, -30)]);
        assert_eq!(forward[0].0, backward[0].0);
        assert_eq!(forward[1].0, backward[1].0);
    }

    #[test]
    fn test_balance_updates_sum_to_zero() {
        for (from, to) in [(5, 9), (9, 5), (100, 1)] {
            let updates = TransferTxParams::new(from, to, 42).balance_updates();
            assert_eq!(updates[0].1 + updates[1].1, 0);
            assert!(updates[0].0 < updates[1].0);
        }
    }

    #[test]
    fn test_check_transfer_currency_mismatch() {
        let arg = TransferTxParams::new(1, 2, 10);
        let err = check_transfer(
            &arg,
            &account(1, 100, Currency::Usd),
            &account(2, 50, Currency::Eur),
        )
        .unwrap_err();
        assert_eq!(err.code(), "CURRENCY_MISMATCH");
    }

    #[test]
    fn test_check_transfer_insufficient_balance() {
        let arg = TransferTxParams::new(1, 2, 101);
        let err = check_transfer(
            &arg,
            &account(1, 100, Currency::Usd),
            &account(2, 50, Currency::Usd),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                account_id: 1,
                balance: 100,
                required: 101
            }
        ));
    }

    #[test]
    fn test_check_transfer_exact_balance_allowed() {
        let arg = TransferTxParams::new(1, 2, 100);
        assert!(
            check_transfer(
                &arg,
                &account(1, 100, Currency::Vnd),
                &account(2, 0, Currency::Vnd),
            )
            .is_ok()
        );
    }

    #[test]
    fn test_check_transfer_overflow() {
        let arg = TransferTxParams::new(1, 2, 10);
        let err = check_transfer(
            &arg,
            &account(1, 100, Currency::Cad),
            &account(2, i64::MAX - 5, Currency::Cad),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow { account_id: 2 }));
    }
}

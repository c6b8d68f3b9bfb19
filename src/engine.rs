// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Transaction engine.
//!
//! The [`Engine`] makes each balance operation and the ledger entries that
//! record it durable as one atomic unit. Every mutating operation follows the
//! same steps:
//!
//! 1. Open a unit of work on the store.
//! 2. Read (and lock) the snapshots it needs. Missing rows abort the unit.
//! 3. Run the pure balance operation. Validation failures abort the unit.
//! 4. Stage the new snapshots and entries in the unit.
//! 5. Commit. A failed commit leaves nothing behind and is retryable.
//!
//! # Thread Safety
//!
//! The engine holds no mutable state of its own. Concurrent operations on
//! disjoint accounts run in parallel; operations on a shared account
//! serialize on the store's row locks. Transfers lock their two accounts in
//! ascending ID order so that transfers in opposite directions between the
//! same pair cannot deadlock. Loans are always locked before accounts.

use crate::account::Account;
use crate::balance;
use crate::base::{AccountId, LoanId, TransactionId, UserId};
use crate::error::LedgerError;
use crate::loan::{Loan, LoanApplication, LoanDecision};
use crate::memory_store::MemoryStore;
use crate::store::{LedgerStore, UnitOfWork};
use crate::transaction::Transaction;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

/// An updated account and the entry recording the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub account: Account,
    pub entry: Transaction,
}

/// Result of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub source: Account,
    pub destination: Account,
    /// `transfer-out` entry on the source account.
    pub outgoing: Transaction,
    /// `transfer-in` entry on the destination account.
    pub incoming: Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repayment {
    pub loan: Loan,
    /// Amount taken off the outstanding balance after capping.
    pub applied: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub loan: Loan,
    /// Present when an approval credited the principal to an account.
    pub disbursement: Option<Posting>,
}

/// Ledger transaction engine over a [`LedgerStore`].
///
/// # Invariants
///
/// - No account balance is negative after a commit.
/// - Every committed balance change has exactly one entry per account
///   touched; a transfer has both legs or neither.
/// - A rejected operation leaves every balance and history untouched.
pub struct Engine<S = MemoryStore> {
    store: S,
}

impl Engine<MemoryStore> {
    /// Creates an engine over an empty in-memory store.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for Engine<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LedgerStore> Engine<S> {
    pub fn with_store(store: S) -> Self {
        Engine { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs `op` inside a unit of work, committing on success and aborting
    /// on error.
    fn in_unit_of_work<'s, T>(
        &'s self,
        op: impl FnOnce(&mut S::Unit<'s>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError>
    where
        S: 's,
    {
        let mut unit = self.store.begin()?;
        match op(&mut unit) {
            Ok(value) => {
                if let Err(err) = unit.commit() {
                    warn!(error = %err, code = err.code(), "commit failed, unit rolled back");
                    return Err(err);
                }
                Ok(value)
            }
            Err(err) => {
                unit.abort();
                warn!(error = %err, code = err.code(), "operation rejected");
                Err(err)
            }
        }
    }

    /// Opens an empty account for `user_id`.
    #[instrument(skip(self))]
    pub fn open_account(&self, user_id: UserId) -> Result<Account, LedgerError> {
        let account = self.in_unit_of_work(|unit| unit.insert_account(user_id))?;
        info!(account = %account.id, "account opened");
        Ok(account)
    }

    /// Soft-deletes an account. Only empty accounts can be closed.
    #[instrument(skip(self))]
    pub fn close_account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let account = self.in_unit_of_work(|unit| {
            let mut account = unit.account(account_id)?;
            if !account.balance.is_zero() {
                return Err(LedgerError::AccountNotEmpty);
            }
            account.deleted_at = Some(unit.now());
            account.updated_at = unit.now();
            unit.put_account(account.clone())?;
            Ok(account)
        })?;
        info!(account = %account_id, "account closed");
        Ok(account)
    }

    /// Credits `amount` to an account.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] - No open account with this ID.
    /// - [`LedgerError::InvalidAmount`] - Amount is zero or negative.
    /// - [`LedgerError::BalanceOverflow`] - The new balance is not representable.
    #[instrument(skip(self))]
    pub fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<Posting, LedgerError> {
        let posting = self.in_unit_of_work(|unit| {
            let account = unit.account(account_id)?;
            let change = balance::apply_deposit(&account, amount)?;
            post(unit, change)
        })?;
        info!(entry = %posting.entry.id, balance = %posting.account.balance, "deposit committed");
        Ok(posting)
    }

    /// Debits `amount` from an account.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] - No open account with this ID.
    /// - [`LedgerError::InvalidAmount`] - Amount is zero or negative.
    /// - [`LedgerError::InsufficientFunds`] - Amount exceeds the balance.
    #[instrument(skip(self))]
    pub fn withdraw(&self, account_id: AccountId, amount: Decimal) -> Result<Posting, LedgerError> {
        let posting = self.in_unit_of_work(|unit| {
            let account = unit.account(account_id)?;
            let change = balance::apply_withdrawal(&account, amount)?;
            post(unit, change)
        })?;
        info!(entry = %posting.entry.id, balance = %posting.account.balance, "withdrawal committed");
        Ok(posting)
    }

    /// Moves `amount` between two accounts.
    ///
    /// Both balance updates and both entries are committed together.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SameAccount`] - Source and destination are equal;
    ///   reported before any account is read.
    /// - [`LedgerError::AccountNotFound`] - Either account is missing.
    /// - [`LedgerError::InvalidAmount`] - Amount is zero or negative.
    /// - [`LedgerError::InsufficientFunds`] - Amount exceeds the source balance.
    /// - [`LedgerError::BalanceOverflow`] - The destination balance is not
    ///   representable.
    #[instrument(skip(self))]
    pub fn transfer(
        &self,
        source_id: AccountId,
        destination_id: AccountId,
        amount: Decimal,
    ) -> Result<Transfer, LedgerError> {
        if source_id == destination_id {
            warn!(account = %source_id, "transfer to the same account rejected");
            return Err(LedgerError::SameAccount);
        }

        let transfer = self.in_unit_of_work(|unit| {
            let (source, destination) = if source_id < destination_id {
                let source = unit.account(source_id)?;
                (source, unit.account(destination_id)?)
            } else {
                let destination = unit.account(destination_id)?;
                (unit.account(source_id)?, destination)
            };

            let legs = balance::apply_transfer(&source, &destination, amount)?;
            let now = unit.now();

            let mut source = legs.source;
            source.updated_at = now;
            let mut destination = legs.destination;
            destination.updated_at = now;

            unit.put_account(source.clone())?;
            unit.put_account(destination.clone())?;
            let outgoing = unit.insert_entry(legs.outgoing)?;
            let incoming = unit.insert_entry(legs.incoming)?;

            Ok(Transfer {
                source,
                destination,
                outgoing,
                incoming,
            })
        })?;
        info!(
            outgoing = %transfer.outgoing.id,
            incoming = %transfer.incoming.id,
            "transfer committed"
        );
        Ok(transfer)
    }

    /// Records a new loan in `pending` state.
    #[instrument(skip(self))]
    pub fn apply_for_loan(&self, application: LoanApplication) -> Result<Loan, LedgerError> {
        application.validate()?;
        let loan = self.in_unit_of_work(|unit| unit.insert_loan(&application))?;
        info!(loan = %loan.id, principal = %loan.principal, "loan application recorded");
        Ok(loan)
    }

    /// Approves or rejects a pending loan.
    ///
    /// An approval with a disbursement account credits the principal to it;
    /// the status change, the credit and its entry commit together.
    #[instrument(skip(self))]
    pub fn authorize_loan(
        &self,
        loan_id: LoanId,
        decision: LoanDecision,
    ) -> Result<Authorization, LedgerError> {
        let authorization = self.in_unit_of_work(|unit| {
            let loan = unit.loan(loan_id)?;
            let mut loan = balance::apply_loan_decision(&loan, decision)?;
            loan.updated_at = unit.now();

            let disbursement = match decision {
                LoanDecision::Approve {
                    disburse_to: Some(account_id),
                } => {
                    let account = unit.account(account_id)?;
                    let change = balance::apply_loan_disbursement(&account, &loan)?;
                    Some(post(unit, change)?)
                }
                _ => None,
            };

            unit.put_loan(loan.clone())?;
            Ok(Authorization { loan, disbursement })
        })?;
        info!(loan = %loan_id, status = %authorization.loan.status, "loan authorized");
        Ok(authorization)
    }

    /// Pays down an active loan, closing it when nothing is left owing.
    ///
    /// Amounts above the outstanding balance are capped, not rejected.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::LoanNotFound`] - No loan with this ID.
    /// - [`LedgerError::InvalidStateTransition`] - Loan is not active.
    /// - [`LedgerError::InvalidAmount`] - Amount is zero or negative.
    #[instrument(skip(self))]
    pub fn repay_loan(&self, loan_id: LoanId, amount: Decimal) -> Result<Repayment, LedgerError> {
        let repayment = self.in_unit_of_work(|unit| {
            let loan = unit.loan(loan_id)?;
            let outcome = balance::apply_loan_repayment(&loan, amount)?;
            let mut loan = outcome.loan;
            loan.updated_at = unit.now();
            unit.put_loan(loan.clone())?;
            Ok(Repayment {
                loan,
                applied: outcome.applied,
            })
        })?;
        info!(
            loan = %loan_id,
            applied = %repayment.applied,
            outstanding = %repayment.loan.outstanding_balance,
            status = %repayment.loan.status,
            "repayment committed"
        );
        Ok(repayment)
    }

    pub fn account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        self.store.account(account_id)
    }

    pub fn loan(&self, loan_id: LoanId) -> Result<Loan, LedgerError> {
        self.store.loan(loan_id)
    }

    pub fn entry(&self, transaction_id: TransactionId) -> Result<Transaction, LedgerError> {
        self.store.entry(transaction_id)
    }

    /// Every entry of an account, newest first.
    pub fn history(&self, account_id: AccountId) -> Result<Vec<Transaction>, LedgerError> {
        self.store.history(account_id)
    }
}

/// Stages a single-account change and its entry.
fn post<U: UnitOfWork>(unit: &mut U, change: balance::BalanceChange) -> Result<Posting, LedgerError> {
    let mut account = change.account;
    account.updated_at = unit.now();
    unit.put_account(account.clone())?;
    let entry = unit.insert_entry(change.entry)?;
    Ok(Posting { account, entry })
}

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

//! In-memory ledger store.
//!
//! Rows live in [`DashMap`]s, each behind its own [`parking_lot::Mutex`].
//! A [`MemoryUnit`] locks every row it reads with an owned guard and keeps
//! it until the unit ends, so overlapping units serialize per row while
//! disjoint ones run in parallel. Writes are staged in the unit and applied
//! while the guards are still held.
//!
//! Never block on a row lock while holding a `DashMap` reference: clone the
//! row's `Arc` out first. A unit holding a row lock may need a shard write
//! lock to insert new rows at commit.

use crate::account::Account;
use crate::base::{AccountId, LoanId, TransactionId, UserId};
use crate::error::LedgerError;
use crate::loan::{Loan, LoanApplication};
use crate::store::{LedgerStore, UnitOfWork};
use crate::transaction::{NewEntry, Transaction};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

type RowGuard<T> = ArcMutexGuard<RawMutex, T>;

/// An account together with the IDs of its entries, oldest first.
#[derive(Debug)]
struct AccountRow {
    account: Account,
    entries: Vec<TransactionId>,
}

/// Thread-safe in-memory [`LedgerStore`].
#[derive(Debug)]
pub struct MemoryStore {
    accounts: DashMap<AccountId, Arc<Mutex<AccountRow>>>,
    loans: DashMap<LoanId, Arc<Mutex<Loan>>>,
    /// Committed entries. Never updated or removed.
    entries: DashMap<TransactionId, Arc<Transaction>>,
    next_account_id: AtomicU64,
    next_loan_id: AtomicU64,
    next_entry_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            loans: DashMap::new(),
            entries: DashMap::new(),
            next_account_id: AtomicU64::new(1),
            next_loan_id: AtomicU64::new(1),
            next_entry_id: AtomicU64::new(1),
        }
    }

    fn account_row(&self, id: AccountId) -> Result<Arc<Mutex<AccountRow>>, LedgerError> {
        self.accounts
            .get(&id)
            .map(|row| Arc::clone(row.value()))
            .ok_or(LedgerError::AccountNotFound(id))
    }

    fn loan_row(&self, id: LoanId) -> Result<Arc<Mutex<Loan>>, LedgerError> {
        self.loans
            .get(&id)
            .map(|row| Arc::clone(row.value()))
            .ok_or(LedgerError::LoanNotFound(id))
    }

    /// Snapshot of every open account, ordered by ID.
    pub fn accounts(&self) -> Vec<Account> {
        let rows: Vec<_> = self.accounts.iter().map(|r| Arc::clone(r.value())).collect();
        let mut accounts: Vec<Account> = rows
            .iter()
            .map(|row| row.lock().account.clone())
            .filter(|account| !account.is_closed())
            .collect();
        accounts.sort_by_key(|account| account.id);
        accounts
    }

    /// Snapshot of every loan, ordered by ID.
    pub fn loans(&self) -> Vec<Loan> {
        let rows: Vec<_> = self.loans.iter().map(|r| Arc::clone(r.value())).collect();
        let mut loans: Vec<Loan> = rows.iter().map(|row| row.lock().clone()).collect();
        loans.sort_by_key(|loan| loan.id);
        loans
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryStore {
    type Unit<'a> = MemoryUnit<'a>;

    fn begin(&self) -> Result<MemoryUnit<'_>, LedgerError> {
        Ok(MemoryUnit::new(self))
    }

    fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let row = self.account_row(id)?;
        let data = row.lock();
        if data.account.is_closed() {
            return Err(LedgerError::AccountNotFound(id));
        }
        Ok(data.account.clone())
    }

    fn loan(&self, id: LoanId) -> Result<Loan, LedgerError> {
        Ok(self.loan_row(id)?.lock().clone())
    }

    fn entry(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.entries
            .get(&id)
            .map(|entry| Transaction::clone(entry.value()))
            .ok_or(LedgerError::TransactionNotFound(id))
    }

    fn history(&self, account_id: AccountId) -> Result<Vec<Transaction>, LedgerError> {
        let ids = {
            let row = self.account_row(account_id)?;
            let data = row.lock();
            if data.account.is_closed() {
                return Err(LedgerError::AccountNotFound(account_id));
            }
            data.entries.clone()
        };

        ids.iter().rev().map(|id| self.entry(*id)).collect()
    }
}

/// A unit of work against a [`MemoryStore`].
///
/// Holds the row locks of everything it has read until it is committed,
/// aborted or dropped.
pub struct MemoryUnit<'a> {
    store: &'a MemoryStore,
    now: DateTime<Utc>,
    locked_accounts: BTreeMap<AccountId, RowGuard<AccountRow>>,
    locked_loans: BTreeMap<LoanId, RowGuard<Loan>>,
    account_writes: BTreeMap<AccountId, Account>,
    loan_writes: BTreeMap<LoanId, Loan>,
    new_accounts: BTreeMap<AccountId, Account>,
    new_loans: BTreeMap<LoanId, Loan>,
    new_entries: Vec<Transaction>,
}

impl<'a> MemoryUnit<'a> {
    fn new(store: &'a MemoryStore) -> Self {
        Self {
            store,
            now: Utc::now(),
            locked_accounts: BTreeMap::new(),
            locked_loans: BTreeMap::new(),
            account_writes: BTreeMap::new(),
            loan_writes: BTreeMap::new(),
            new_accounts: BTreeMap::new(),
            new_loans: BTreeMap::new(),
            new_entries: Vec::new(),
        }
    }

    /// Checks the whole write set before anything is applied.
    fn validate(&self) -> Result<(), LedgerError> {
        for entry in &self.new_entries {
            let known = self.locked_accounts.contains_key(&entry.account_id)
                || self.new_accounts.contains_key(&entry.account_id);
            if !known {
                return Err(LedgerError::StorageFailure(format!(
                    "entry {} references account {} outside the unit of work",
                    entry.id, entry.account_id
                )));
            }
        }

        let staged = self.account_writes.values().chain(self.new_accounts.values());
        for account in staged {
            if account.balance < Decimal::ZERO {
                return Err(LedgerError::StorageFailure(format!(
                    "account {} would commit a negative balance",
                    account.id
                )));
            }
        }

        Ok(())
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn account(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        if let Some(account) = self
            .account_writes
            .get(&id)
            .or_else(|| self.new_accounts.get(&id))
        {
            return Ok(account.clone());
        }
        if let Some(guard) = self.locked_accounts.get(&id) {
            return Ok(guard.account.clone());
        }

        let row = self.store.account_row(id)?;
        let guard = row.lock_arc();
        trace!(account = %id, "account row locked");
        if guard.account.is_closed() {
            return Err(LedgerError::AccountNotFound(id));
        }
        let account = guard.account.clone();
        self.locked_accounts.insert(id, guard);
        Ok(account)
    }

    fn loan(&mut self, id: LoanId) -> Result<Loan, LedgerError> {
        if let Some(loan) = self.loan_writes.get(&id).or_else(|| self.new_loans.get(&id)) {
            return Ok(loan.clone());
        }
        if let Some(guard) = self.locked_loans.get(&id) {
            return Ok(Loan::clone(guard));
        }

        let row = self.store.loan_row(id)?;
        let guard = row.lock_arc();
        trace!(loan = %id, "loan row locked");
        let loan = Loan::clone(&guard);
        self.locked_loans.insert(id, guard);
        Ok(loan)
    }

    fn put_account(&mut self, account: Account) -> Result<(), LedgerError> {
        if let Some(staged) = self.new_accounts.get_mut(&account.id) {
            *staged = account;
            return Ok(());
        }
        if !self.locked_accounts.contains_key(&account.id) {
            return Err(LedgerError::StorageFailure(format!(
                "account {} was not read in this unit of work",
                account.id
            )));
        }
        self.account_writes.insert(account.id, account);
        Ok(())
    }

    fn put_loan(&mut self, loan: Loan) -> Result<(), LedgerError> {
        if let Some(staged) = self.new_loans.get_mut(&loan.id) {
            *staged = loan;
            return Ok(());
        }
        if !self.locked_loans.contains_key(&loan.id) {
            return Err(LedgerError::StorageFailure(format!(
                "loan {} was not read in this unit of work",
                loan.id
            )));
        }
        self.loan_writes.insert(loan.id, loan);
        Ok(())
    }

    fn insert_account(&mut self, user_id: UserId) -> Result<Account, LedgerError> {
        let id = AccountId(self.store.next_account_id.fetch_add(1, Ordering::SeqCst));
        let account = Account::new(id, user_id, self.now);
        self.new_accounts.insert(id, account.clone());
        Ok(account)
    }

    fn insert_loan(&mut self, application: &LoanApplication) -> Result<Loan, LedgerError> {
        let id = LoanId(self.store.next_loan_id.fetch_add(1, Ordering::SeqCst));
        let loan = Loan::new(id, application, self.now);
        self.new_loans.insert(id, loan.clone());
        Ok(loan)
    }

    fn insert_entry(&mut self, entry: NewEntry) -> Result<Transaction, LedgerError> {
        let id = TransactionId(self.store.next_entry_id.fetch_add(1, Ordering::SeqCst));
        let transaction = Transaction::new(id, entry, self.now);
        self.new_entries.push(transaction.clone());
        Ok(transaction)
    }

    fn commit(mut self) -> Result<(), LedgerError> {
        self.validate()?;

        let store = self.store;
        let entry_count = self.new_entries.len();

        let mut new_rows: BTreeMap<AccountId, AccountRow> = std::mem::take(&mut self.new_accounts)
            .into_iter()
            .map(|(id, account)| {
                let row = AccountRow {
                    account,
                    entries: Vec::new(),
                };
                (id, row)
            })
            .collect();

        let new_entries = std::mem::take(&mut self.new_entries);
        for entry in &new_entries {
            if let Some(guard) = self.locked_accounts.get_mut(&entry.account_id) {
                guard.entries.push(entry.id);
            } else if let Some(row) = new_rows.get_mut(&entry.account_id) {
                row.entries.push(entry.id);
            }
        }

        for (id, account) in std::mem::take(&mut self.account_writes) {
            if let Some(guard) = self.locked_accounts.get_mut(&id) {
                guard.account = account;
            }
        }

        for (id, loan) in std::mem::take(&mut self.loan_writes) {
            if let Some(guard) = self.locked_loans.get_mut(&id) {
                **guard = loan;
            }
        }

        // Entries are published only once the balances they record are in
        // place, and before any new row can list them.
        for entry in new_entries {
            store.entries.insert(entry.id, Arc::new(entry));
        }

        for (id, row) in new_rows {
            store.accounts.insert(id, Arc::new(Mutex::new(row)));
        }
        for (id, loan) in std::mem::take(&mut self.new_loans) {
            store.loans.insert(id, Arc::new(Mutex::new(loan)));
        }

        debug!(
            accounts = self.locked_accounts.len(),
            loans = self.locked_loans.len(),
            entries = entry_count,
            "unit of work committed"
        );
        Ok(())
    }

    fn abort(self) {
        debug!(
            accounts = self.locked_accounts.len(),
            loans = self.locked_loans.len(),
            "unit of work aborted"
        );
    }
}

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

//! Ledger store contract.
//!
//! The engine only talks to storage through these two traits. A
//! [`LedgerStore`] hands out [`UnitOfWork`]s; everything read through a unit
//! is isolated from other units until it commits or aborts, and everything
//! written through it becomes visible all at once on [`UnitOfWork::commit`]
//! or not at all.
//!
//! Implementations must guarantee that two units touching the same account
//! or loan never both observe the pre-mutation state and both commit. The
//! bundled [`MemoryStore`](crate::MemoryStore) does this with row-level
//! exclusive locks held for the lifetime of the unit.

use crate::account::Account;
use crate::base::{AccountId, LoanId, TransactionId, UserId};
use crate::error::LedgerError;
use crate::loan::{Loan, LoanApplication};
use crate::transaction::{NewEntry, Transaction};
use chrono::{DateTime, Utc};

/// A bounded sequence of reads and writes that commits or aborts as one.
///
/// Dropping a unit without calling [`commit`](UnitOfWork::commit) aborts it.
pub trait UnitOfWork {
    /// Timestamp of the unit. Every record written through it carries this
    /// time.
    fn now(&self) -> DateTime<Utc>;

    /// Reads an account and holds it for the rest of the unit.
    ///
    /// Closed accounts are reported as missing.
    fn account(&mut self, id: AccountId) -> Result<Account, LedgerError>;

    /// Reads a loan and holds it for the rest of the unit.
    fn loan(&mut self, id: LoanId) -> Result<Loan, LedgerError>;

    /// Stages an update to an account previously read through this unit.
    fn put_account(&mut self, account: Account) -> Result<(), LedgerError>;

    /// Stages an update to a loan previously read through this unit.
    fn put_loan(&mut self, loan: Loan) -> Result<(), LedgerError>;

    /// Stages a new empty account and returns it with its allocated ID.
    fn insert_account(&mut self, user_id: UserId) -> Result<Account, LedgerError>;

    /// Stages a new pending loan and returns it with its allocated ID.
    fn insert_loan(&mut self, application: &LoanApplication) -> Result<Loan, LedgerError>;

    /// Stages a ledger entry and returns it with its allocated ID.
    fn insert_entry(&mut self, entry: NewEntry) -> Result<Transaction, LedgerError>;

    /// Applies every staged write atomically.
    ///
    /// On error nothing staged in this unit is visible to anyone.
    fn commit(self) -> Result<(), LedgerError>;

    /// Discards every staged write.
    fn abort(self);
}

/// Durable home of accounts, loans and ledger entries.
pub trait LedgerStore: Send + Sync {
    type Unit<'a>: UnitOfWork
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Unit<'_>, LedgerError>;

    fn account(&self, id: AccountId) -> Result<Account, LedgerError>;

    fn loan(&self, id: LoanId) -> Result<Loan, LedgerError>;

    fn entry(&self, id: TransactionId) -> Result<Transaction, LedgerError>;

    /// All entries of an account, newest first.
    fn history(&self, account_id: AccountId) -> Result<Vec<Transaction>, LedgerError>;
}

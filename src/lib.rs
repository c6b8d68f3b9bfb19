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

//! # Bank Ledger
//!
//! This library maintains account balances and loans, and records an
//! immutable ledger entry for every balance change, under concurrent access
//! from many callers.
//!
//! ## Core Components
//!
//! - [`Engine`]: Runs deposits, withdrawals, transfers and loan operations as
//!   atomic units of work
//! - [`balance`]: Pure balance operations that validate and compute new state
//! - [`LoanStatus`]: Loan lifecycle state machine
//! - [`LedgerStore`] / [`UnitOfWork`]: Storage contract, with [`MemoryStore`]
//!   as the bundled implementation
//! - [`LedgerError`]: Error types for rejected operations
//!
//! ## Example
//!
//! ```
//! use bank_ledger::{Engine, EntryKind, LedgerError, UserId};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let alice = engine.open_account(UserId(1)).unwrap();
//! let bob = engine.open_account(UserId(2)).unwrap();
//!
//! engine.deposit(alice.id, dec!(200)).unwrap();
//! let transfer = engine.transfer(alice.id, bob.id, dec!(50)).unwrap();
//! assert_eq!(transfer.source.balance, dec!(150));
//! assert_eq!(transfer.destination.balance, dec!(50));
//!
//! // Rejected operations leave no trace.
//! let result = engine.withdraw(bob.id, dec!(80));
//! assert_eq!(result, Err(LedgerError::InsufficientFunds));
//!
//! let history = engine.history(alice.id).unwrap();
//! assert_eq!(history[0].kind, EntryKind::TransferOut);
//! assert_eq!(history[1].kind, EntryKind::Deposit);
//! ```
//!
//! ## Thread Safety
//!
//! The engine can be shared between threads. Operations on different
//! accounts run in parallel; operations on the same account serialize on the
//! store's row locks.

pub mod account;
pub mod balance;
mod base;
mod engine;
pub mod error;
pub mod loan;
mod memory_store;
pub mod store;
mod transaction;

pub use account::Account;
pub use base::{AccountId, LoanId, TransactionId, UserId};
pub use engine::{Authorization, Engine, Posting, Repayment, Transfer};
pub use error::LedgerError;
pub use loan::{Loan, LoanApplication, LoanDecision, LoanEvent, LoanStatus};
pub use memory_store::{MemoryStore, MemoryUnit};
pub use store::{LedgerStore, UnitOfWork};
pub use transaction::{EntryKind, NewEntry, Transaction};

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

//! Error types for ledger operations.
//!
//! Every variant except [`LedgerError::StorageFailure`] is a validation
//! error: it is detected before anything is written, and retrying without
//! changing the input will fail the same way.

use crate::base::{AccountId, LoanId, TransactionId};
use crate::loan::{LoanEvent, LoanStatus};
use thiserror::Error;

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Account does not exist or has been closed
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// Loan does not exist
    #[error("loan {0} not found")]
    LoanNotFound(LoanId),

    /// Ledger entry does not exist
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Withdrawal or transfer would exceed the balance
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Transfer source and destination are the same account
    #[error("cannot transfer to the same account")]
    SameAccount,

    /// Loan operation attempted outside its valid state
    #[error("cannot {event} a loan that is {status}")]
    InvalidStateTransition { status: LoanStatus, event: LoanEvent },

    /// Interest rate is negative or term is zero
    #[error("invalid loan terms")]
    InvalidLoanTerms,

    /// Credit would take the balance past the largest representable amount
    #[error("balance would overflow")]
    BalanceOverflow,

    /// Only accounts with a zero balance can be closed
    #[error("account still holds funds")]
    AccountNotEmpty,

    /// The unit of work could not be committed; nothing was written
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl LedgerError {
    /// Stable machine-readable code for the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "account_not_found",
            Self::LoanNotFound(_) => "loan_not_found",
            Self::TransactionNotFound(_) => "transaction_not_found",
            Self::InvalidAmount => "invalid_amount",
            Self::InsufficientFunds => "insufficient_funds",
            Self::SameAccount => "same_account",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::InvalidLoanTerms => "invalid_loan_terms",
            Self::BalanceOverflow => "balance_overflow",
            Self::AccountNotEmpty => "account_not_empty",
            Self::StorageFailure(_) => "storage_failure",
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageFailure(_))
    }
}

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

//! Loans and their lifecycle.
//!
//! Loan status follows a one-directional state machine:
//!
//! ```text
//!  Pending ──approve──► Active ──settle──► Closed
//!     │                 │  ▲
//!     │                 └──┘ repay
//!     └──reject──► Rejected
//! ```
//!
//! `Rejected` and `Closed` are terminal. Any event not listed above fails
//! with [`LedgerError::InvalidStateTransition`].

use crate::base::{LoanId, UserId};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Active,
    Rejected,
    Closed,
}

/// Something that happens to a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanEvent {
    /// Authorization granted.
    Approve,
    /// Authorization denied.
    Reject,
    /// Partial repayment that leaves a balance outstanding.
    Repay,
    /// Repayment that brings the outstanding balance to zero.
    Settle,
}

impl LoanStatus {
    /// Applies `event` according to the transition table.
    pub fn transition(self, event: LoanEvent) -> Result<LoanStatus, LedgerError> {
        use LoanEvent::*;
        use LoanStatus::*;

        match (self, event) {
            (Pending, Approve) => Ok(Active),
            (Pending, Reject) => Ok(Rejected),
            (Active, Repay) => Ok(Active),
            (Active, Settle) => Ok(Closed),
            (status, event) => Err(LedgerError::InvalidStateTransition { status, event }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::Rejected | LoanStatus::Closed)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Active => "active",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

impl fmt::Display for LoanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoanEvent::Approve => "approve",
            LoanEvent::Reject => "reject",
            LoanEvent::Repay => "repay",
            LoanEvent::Settle => "settle",
        };
        f.write_str(name)
    }
}

/// A request for a new loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanApplication {
    pub user_id: UserId,
    pub principal: Decimal,
    /// Annual rate in percent (`5` means 5%).
    pub interest_rate: Decimal,
    pub term_months: u32,
}

impl LoanApplication {
    pub(crate) fn validate(&self) -> Result<(), LedgerError> {
        if self.principal <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.interest_rate < Decimal::ZERO || self.term_months == 0 {
            return Err(LedgerError::InvalidLoanTerms);
        }
        Ok(())
    }
}

/// Outcome of authorizing a pending loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanDecision {
    /// Activate the loan, optionally crediting the principal to an account.
    Approve {
        disburse_to: Option<crate::base::AccountId>,
    },
    Reject,
}

impl LoanDecision {
    pub fn event(&self) -> LoanEvent {
        match self {
            LoanDecision::Approve { .. } => LoanEvent::Approve,
            LoanDecision::Reject => LoanEvent::Reject,
        }
    }
}

/// Snapshot of a loan.
///
/// Loans are values: the store owns the durable row and hands out copies.
/// Changes go through the balance operations and are written back inside a
/// unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    pub id: LoanId,
    pub user_id: UserId,
    pub principal: Decimal,
    pub interest_rate: Decimal,
    pub term_months: u32,
    pub status: LoanStatus,
    pub outstanding_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    const DECIMAL_PRECISION: u32 = 4;

    /// Creates a pending loan whose outstanding balance equals its principal.
    pub fn new(id: LoanId, application: &LoanApplication, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: application.user_id,
            principal: application.principal,
            interest_rate: application.interest_rate,
            term_months: application.term_months,
            status: LoanStatus::Pending,
            outstanding_balance: application.principal,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn assert_invariants(&self) {
        debug_assert!(
            self.outstanding_balance >= Decimal::ZERO,
            "Invariant violated: outstanding balance went negative: {}",
            self.outstanding_balance
        );
        debug_assert!(
            self.outstanding_balance <= self.principal,
            "Invariant violated: outstanding {} exceeds principal {}",
            self.outstanding_balance,
            self.principal
        );
    }
}

impl Serialize for Loan {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Loan", 7)?;
        state.serialize_field("loan", &self.id)?;
        state.serialize_field("user", &self.user_id)?;
        state.serialize_field(
            "principal",
            &self.principal.round_dp(Loan::DECIMAL_PRECISION),
        )?;
        state.serialize_field("interest_rate", &self.interest_rate)?;
        state.serialize_field("term_months", &self.term_months)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field(
            "outstanding",
            &self.outstanding_balance.round_dp(Loan::DECIMAL_PRECISION),
        )?;
        state.end()
    }
}

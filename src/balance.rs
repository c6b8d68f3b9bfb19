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

//! Balance operations.
//!
//! Pure functions from a snapshot and a request to a new snapshot plus the
//! ledger entries describing the change. Nothing here touches storage or the
//! clock; a failed check returns an error and the input snapshot is left as
//! it was. Persisting the result is the engine's job.

use crate::account::Account;
use crate::error::LedgerError;
use crate::loan::{Loan, LoanDecision, LoanEvent, LoanStatus};
use crate::transaction::{EntryKind, NewEntry};
use rust_decimal::Decimal;

/// New account state and the entry that records it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub account: Account,
    pub entry: NewEntry,
}

/// Both legs of a transfer. Always persisted together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLegs {
    pub source: Account,
    pub destination: Account,
    pub outgoing: NewEntry,
    pub incoming: NewEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepaymentOutcome {
    pub loan: Loan,
    /// Amount actually taken off the outstanding balance, after capping.
    pub applied: Decimal,
}

fn ensure_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

fn credit(
    account: &Account,
    kind: EntryKind,
    amount: Decimal,
    description: String,
) -> Result<BalanceChange, LedgerError> {
    ensure_positive(amount)?;
    let mut updated = account.clone();
    updated.balance = account
        .balance
        .checked_add(amount)
        .ok_or(LedgerError::BalanceOverflow)?;
    updated.assert_invariants();
    Ok(BalanceChange {
        entry: NewEntry {
            account_id: updated.id,
            kind,
            amount,
            description,
        },
        account: updated,
    })
}

fn debit(
    account: &Account,
    kind: EntryKind,
    amount: Decimal,
    description: String,
) -> Result<BalanceChange, LedgerError> {
    ensure_positive(amount)?;
    if account.balance < amount {
        return Err(LedgerError::InsufficientFunds);
    }
    let mut updated = account.clone();
    updated.balance -= amount;
    updated.assert_invariants();
    Ok(BalanceChange {
        entry: NewEntry {
            account_id: updated.id,
            kind,
            amount,
            description,
        },
        account: updated,
    })
}

/// Increases the balance by `amount`. No upper bound beyond what `Decimal`
/// can represent.
pub fn apply_deposit(account: &Account, amount: Decimal) -> Result<BalanceChange, LedgerError> {
    credit(account, EntryKind::Deposit, amount, "Deposit operation".to_string())
}

/// Decreases the balance by `amount`, failing if that would go below zero.
pub fn apply_withdrawal(account: &Account, amount: Decimal) -> Result<BalanceChange, LedgerError> {
    debit(
        account,
        EntryKind::Withdrawal,
        amount,
        "Withdrawal operation".to_string(),
    )
}

/// Moves `amount` from `source` to `destination`.
///
/// Each leg's description names the counter-account.
pub fn apply_transfer(
    source: &Account,
    destination: &Account,
    amount: Decimal,
) -> Result<TransferLegs, LedgerError> {
    if source.id == destination.id {
        return Err(LedgerError::SameAccount);
    }

    let out = debit(
        source,
        EntryKind::TransferOut,
        amount,
        format!("Transfer to account {}", destination.id),
    )?;
    let inc = credit(
        destination,
        EntryKind::TransferIn,
        amount,
        format!("Transfer from account {}", source.id),
    )?;

    Ok(TransferLegs {
        source: out.account,
        destination: inc.account,
        outgoing: out.entry,
        incoming: inc.entry,
    })
}

/// Credits an approved loan's principal to `account`.
pub fn apply_loan_disbursement(
    account: &Account,
    loan: &Loan,
) -> Result<BalanceChange, LedgerError> {
    if loan.status != LoanStatus::Active {
        return Err(LedgerError::InvalidStateTransition {
            status: loan.status,
            event: LoanEvent::Approve,
        });
    }
    credit(
        account,
        EntryKind::Deposit,
        loan.principal,
        format!("Loan {} disbursement", loan.id),
    )
}

/// Approves or rejects a pending loan.
pub fn apply_loan_decision(loan: &Loan, decision: LoanDecision) -> Result<Loan, LedgerError> {
    let status = loan.status.transition(decision.event())?;
    Ok(Loan {
        status,
        ..loan.clone()
    })
}

/// Pays down an active loan.
///
/// Overpayment is capped at the outstanding balance rather than rejected.
/// When the outstanding balance reaches zero the loan is closed.
pub fn apply_loan_repayment(loan: &Loan, amount: Decimal) -> Result<RepaymentOutcome, LedgerError> {
    if loan.status != LoanStatus::Active {
        return Err(LedgerError::InvalidStateTransition {
            status: loan.status,
            event: LoanEvent::Repay,
        });
    }
    ensure_positive(amount)?;

    let applied = amount.min(loan.outstanding_balance);
    let outstanding = loan.outstanding_balance - applied;
    let event = if outstanding.is_zero() {
        LoanEvent::Settle
    } else {
        LoanEvent::Repay
    };

    let updated = Loan {
        status: loan.status.transition(event)?,
        outstanding_balance: outstanding,
        ..loan.clone()
    };
    updated.assert_invariants();

    Ok(RepaymentOutcome {
        loan: updated,
        applied,
    })
}

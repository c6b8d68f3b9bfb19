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

//! Property-based tests for the ledger engine.
//!
//! These tests verify invariants that should hold for any sequence of
//! operations, accepted or rejected.

use bank_ledger::{
    AccountId, Engine, LedgerError, LoanApplication, LoanDecision, LoanStatus, UserId,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.0001 to 1000 with 4 decimal places).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000i64).prop_map(|units| Decimal::new(units, 4))
}

/// Generate any amount, including zero and negatives.
fn arb_any_amount() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..=10_000_000i64).prop_map(|units| Decimal::new(units, 4))
}

#[derive(Debug, Clone)]
enum Op {
    Deposit(usize, Decimal),
    Withdraw(usize, Decimal),
    Transfer(usize, usize, Decimal),
}

const ACCOUNTS: usize = 4;

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..ACCOUNTS, arb_any_amount()).prop_map(|(a, amt)| Op::Deposit(a, amt)),
        (0..ACCOUNTS, arb_any_amount()).prop_map(|(a, amt)| Op::Withdraw(a, amt)),
        (0..ACCOUNTS, 0..ACCOUNTS, arb_any_amount())
            .prop_map(|(a, b, amt)| Op::Transfer(a, b, amt)),
    ]
}

fn open_accounts(engine: &Engine) -> Vec<AccountId> {
    (0..ACCOUNTS)
        .map(|i| engine.open_account(UserId(i as u64)).unwrap().id)
        .collect()
}

fn run(engine: &Engine, ids: &[AccountId], op: &Op) -> Result<(), LedgerError> {
    match *op {
        Op::Deposit(a, amount) => engine.deposit(ids[a], amount).map(drop),
        Op::Withdraw(a, amount) => engine.withdraw(ids[a], amount).map(drop),
        Op::Transfer(a, b, amount) => engine.transfer(ids[a], ids[b], amount).map(drop),
    }
}

// =============================================================================
// Account Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Balances are never negative after any sequence of operations.
    #[test]
    fn balance_never_negative(ops in prop::collection::vec(arb_op(), 1..40)) {
        let engine = Engine::new();
        let ids = open_accounts(&engine);

        for op in &ops {
            let _ = run(&engine, &ids, op);
            for id in &ids {
                prop_assert!(engine.account(*id).unwrap().balance >= Decimal::ZERO);
            }
        }
    }

    /// The signed sum of an account's history equals its balance.
    #[test]
    fn history_reconciles_with_balance(ops in prop::collection::vec(arb_op(), 1..40)) {
        let engine = Engine::new();
        let ids = open_accounts(&engine);

        for op in &ops {
            let _ = run(&engine, &ids, op);
        }

        for id in &ids {
            let sum: Decimal = engine
                .history(*id)
                .unwrap()
                .iter()
                .map(|entry| entry.signed_amount())
                .sum();
            prop_assert_eq!(sum, engine.account(*id).unwrap().balance);
        }
    }

    /// Money only enters through deposits and leaves through withdrawals.
    #[test]
    fn transfers_conserve_total(ops in prop::collection::vec(arb_op(), 1..40)) {
        let engine = Engine::new();
        let ids = open_accounts(&engine);
        let mut expected = Decimal::ZERO;

        for op in &ops {
            if run(&engine, &ids, op).is_ok() {
                match *op {
                    Op::Deposit(_, amount) => expected += amount,
                    Op::Withdraw(_, amount) => expected -= amount,
                    Op::Transfer(..) => {}
                }
            }
        }

        let total: Decimal = ids.iter().map(|id| engine.account(*id).unwrap().balance).sum();
        prop_assert_eq!(total, expected);
    }

    /// A rejected operation leaves every account and history unchanged.
    #[test]
    fn rejected_operations_change_nothing(
        setup in prop::collection::vec(arb_op(), 0..20),
        op in arb_op(),
    ) {
        let engine = Engine::new();
        let ids = open_accounts(&engine);
        for op in &setup {
            let _ = run(&engine, &ids, op);
        }

        let accounts_before: Vec<_> = ids.iter().map(|id| engine.account(*id).unwrap()).collect();
        let histories_before: Vec<_> = ids.iter().map(|id| engine.history(*id).unwrap()).collect();

        if run(&engine, &ids, &op).is_err() {
            let accounts_after: Vec<_> = ids.iter().map(|id| engine.account(*id).unwrap()).collect();
            let histories_after: Vec<_> = ids.iter().map(|id| engine.history(*id).unwrap()).collect();
            prop_assert_eq!(accounts_before, accounts_after);
            prop_assert_eq!(histories_before, histories_after);
        }
    }
}

// =============================================================================
// Transfer Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A transfer either produces two equal legs or nothing at all.
    #[test]
    fn transfer_is_all_or_nothing(
        initial in arb_amount(),
        amount in arb_any_amount(),
    ) {
        let engine = Engine::new();
        let ids = open_accounts(&engine);
        engine.deposit(ids[0], initial).unwrap();
        let sum_before = initial;

        match engine.transfer(ids[0], ids[1], amount) {
            Ok(transfer) => {
                prop_assert_eq!(transfer.outgoing.amount, transfer.incoming.amount);
                prop_assert_eq!(transfer.outgoing.amount, amount);
                prop_assert_eq!(engine.history(ids[0]).unwrap().len(), 2);
                prop_assert_eq!(engine.history(ids[1]).unwrap().len(), 1);
            }
            Err(_) => {
                prop_assert_eq!(engine.history(ids[0]).unwrap().len(), 1);
                prop_assert!(engine.history(ids[1]).unwrap().is_empty());
            }
        }

        let sum_after = engine.account(ids[0]).unwrap().balance
            + engine.account(ids[1]).unwrap().balance;
        prop_assert_eq!(sum_before, sum_after);
    }
}

// =============================================================================
// Balance Ceiling Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Near `Decimal::MAX`, a credit either lands exactly or fails with
    /// `BalanceOverflow` and leaves both accounts untouched.
    #[test]
    fn credits_near_decimal_max_never_panic(
        headroom in 0i64..=1_000,
        amount in 1i64..=2_000,
        via_transfer in any::<bool>(),
    ) {
        let engine = Engine::new();
        let ids = open_accounts(&engine);
        let start = Decimal::MAX - Decimal::from(headroom);
        engine.deposit(ids[1], start).unwrap();
        engine.deposit(ids[0], Decimal::from(amount)).unwrap();
        let amount = Decimal::from(amount);

        let result = if via_transfer {
            engine.transfer(ids[0], ids[1], amount).map(drop)
        } else {
            engine.deposit(ids[1], amount).map(drop)
        };

        if amount <= Decimal::from(headroom) {
            prop_assert!(result.is_ok());
            prop_assert_eq!(engine.account(ids[1]).unwrap().balance, start + amount);
        } else {
            prop_assert_eq!(result, Err(LedgerError::BalanceOverflow));
            prop_assert_eq!(engine.account(ids[1]).unwrap().balance, start);
            prop_assert_eq!(engine.account(ids[0]).unwrap().balance, amount);
            prop_assert_eq!(engine.history(ids[1]).unwrap().len(), 1);
        }
    }
}

// =============================================================================
// Loan Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Outstanding never increases, never exceeds principal, and the loan
    /// closes exactly when it reaches zero.
    #[test]
    fn loan_outstanding_is_monotonic(
        principal in arb_amount(),
        repayments in prop::collection::vec(arb_amount(), 1..10),
    ) {
        let engine = Engine::new();
        let loan = engine
            .apply_for_loan(LoanApplication {
                user_id: UserId(1),
                principal,
                interest_rate: Decimal::ONE,
                term_months: 12,
            })
            .unwrap();
        engine
            .authorize_loan(loan.id, LoanDecision::Approve { disburse_to: None })
            .unwrap();

        let mut outstanding = principal;
        for amount in repayments {
            match engine.repay_loan(loan.id, amount) {
                Ok(repayment) => {
                    prop_assert!(repayment.applied <= amount);
                    prop_assert_eq!(repayment.applied, amount.min(outstanding));
                    prop_assert!(repayment.loan.outstanding_balance <= outstanding);
                    prop_assert!(repayment.loan.outstanding_balance <= principal);
                    outstanding = repayment.loan.outstanding_balance;
                    prop_assert_eq!(
                        repayment.loan.status == LoanStatus::Closed,
                        outstanding.is_zero()
                    );
                }
                Err(err) => {
                    // Only a closed loan refuses a positive repayment.
                    prop_assert!(outstanding.is_zero());
                    let is_state_error =
                        matches!(err, LedgerError::InvalidStateTransition { .. });
                    prop_assert!(is_state_error);
                }
            }
        }
    }
}

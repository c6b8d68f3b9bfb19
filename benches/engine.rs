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

//! Benchmarks for the ledger engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded deposits, withdrawals and transfers
//! - Parallel transfers over disjoint and shared accounts
//! - Loan repayment
//! - History reads as the ledger grows

use bank_ledger::{AccountId, Engine, LoanApplication, LoanDecision, UserId};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal::Decimal;

// =============================================================================
// Helper Functions
// =============================================================================

fn amount(units: i64) -> Decimal {
    Decimal::new(units, 4)
}

fn funded_engine(accounts: usize, balance: i64) -> (Engine, Vec<AccountId>) {
    let engine = Engine::new();
    let ids = (0..accounts)
        .map(|i| {
            let id = engine.open_account(UserId(i as u64)).unwrap().id;
            engine.deposit(id, amount(balance)).unwrap();
            id
        })
        .collect();
    (engine, ids)
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_single_deposit(c: &mut Criterion) {
    let (engine, ids) = funded_engine(1, 10_000);
    c.bench_function("single_deposit", |b| {
        b.iter(|| engine.deposit(black_box(ids[0]), amount(10_000)).unwrap())
    });
}

fn bench_deposit_withdraw_pair(c: &mut Criterion) {
    let (engine, ids) = funded_engine(1, 10_000);
    c.bench_function("deposit_withdraw_pair", |b| {
        b.iter(|| {
            engine.deposit(ids[0], amount(10_000)).unwrap();
            engine.withdraw(black_box(ids[0]), amount(10_000)).unwrap();
        })
    });
}

fn bench_transfer_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_throughput");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let (engine, ids) = funded_engine(2, 1_000_000_000);
                for i in 0..count {
                    let (from, to) = if i % 2 == 0 { (ids[0], ids[1]) } else { (ids[1], ids[0]) };
                    engine.transfer(from, to, amount(10_000)).unwrap();
                }
                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_rejected_withdrawal(c: &mut Criterion) {
    let (engine, ids) = funded_engine(1, 100);
    c.bench_function("rejected_withdrawal", |b| {
        b.iter(|| {
            let _ = engine.withdraw(black_box(ids[0]), amount(1_000_000));
        })
    });
}

// =============================================================================
// Loan Benchmarks
// =============================================================================

fn bench_loan_repayment(c: &mut Criterion) {
    c.bench_function("loan_apply_approve_repay", |b| {
        let engine = Engine::new();
        b.iter(|| {
            let loan = engine
                .apply_for_loan(LoanApplication {
                    user_id: UserId(1),
                    principal: amount(1_000_000),
                    interest_rate: Decimal::ONE,
                    term_months: 12,
                })
                .unwrap();
            engine
                .authorize_loan(loan.id, LoanDecision::Approve { disburse_to: None })
                .unwrap();
            engine.repay_loan(loan.id, black_box(amount(2_000_000))).unwrap();
        })
    });
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_transfers_disjoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_transfers_disjoint");
    let ops = 10_000;
    group.throughput(Throughput::Elements(ops as u64));

    group.bench_function("pairs", |b| {
        b.iter_batched(
            || funded_engine(64, 1_000_000_000),
            |(engine, ids)| {
                (0..ops).into_par_iter().for_each(|i| {
                    let pair = (i % 32) * 2;
                    let _ = engine.transfer(ids[pair], ids[pair + 1], amount(100));
                });
            },
            criterion::BatchSize::LargeInput,
        )
    });
    group.finish();
}

fn bench_parallel_transfers_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_transfers_contended");
    let ops = 10_000;
    group.throughput(Throughput::Elements(ops as u64));

    group.bench_function("shared_destination", |b| {
        b.iter_batched(
            || funded_engine(9, 1_000_000_000),
            |(engine, ids)| {
                (0..ops).into_par_iter().for_each(|i| {
                    let _ = engine.transfer(ids[1 + i % 8], ids[0], amount(100));
                });
            },
            criterion::BatchSize::LargeInput,
        )
    });
    group.finish();
}

// =============================================================================
// History Benchmarks
// =============================================================================

fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("history");

    for size in [10, 100, 1_000].iter() {
        let (engine, ids) = funded_engine(1, 1);
        for _ in 0..*size {
            engine.deposit(ids[0], amount(100)).unwrap();
        }
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(engine.history(ids[0]).unwrap()))
        });
    }
    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    single_threaded,
    bench_single_deposit,
    bench_deposit_withdraw_pair,
    bench_transfer_throughput,
    bench_rejected_withdrawal,
);

criterion_group!(loans, bench_loan_repayment,);

criterion_group!(
    multi_threaded,
    bench_parallel_transfers_disjoint,
    bench_parallel_transfers_contended,
);

criterion_group!(history, bench_history,);

criterion_main!(single_threaded, loans, multi_threaded, history);

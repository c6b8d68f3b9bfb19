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

use anyhow::{Context, Result};
use bank_ledger::{
    AccountId, Engine, LedgerError, LoanApplication, LoanDecision, LoanId, UserId,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Bank Ledger - Replay ledger operation CSV files
///
/// Reads operations from a CSV file, applies them to an in-memory ledger and
/// writes the resulting accounts to stdout.
#[derive(Parser, Debug)]
#[command(name = "bank-ledger")]
#[command(about = "Replays ledger operations and prints account balances", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,subject,counterparty,amount,rate,term
    /// Example: cargo run -- operations.csv > accounts.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Also write the final loan table to this file
    #[arg(long, value_name = "FILE")]
    loans: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let file = File::open(&args.input)
        .with_context(|| format!("opening '{}'", args.input.display()))?;
    let engine = process_operations(BufReader::new(file)).context("processing operations")?;

    write_accounts(&engine, std::io::stdout()).context("writing accounts")?;

    if let Some(path) = &args.loans {
        let out = File::create(path).with_context(|| format!("creating '{}'", path.display()))?;
        write_loans(&engine, out).context("writing loans")?;
    }

    Ok(())
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, subject, counterparty, amount, rate, term`
///
/// `subject` is a user ID for `open` and `apply`, a loan ID for `approve`,
/// `reject` and `repay`, and an account ID otherwise.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op: String,
    subject: u64,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    counterparty: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    rate: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    term: Option<u32>,
}

/// A parsed operation, ready for the engine.
#[derive(Debug, Clone, PartialEq)]
enum Operation {
    Open(UserId),
    Close(AccountId),
    Deposit(AccountId, Decimal),
    Withdraw(AccountId, Decimal),
    Transfer(AccountId, AccountId, Decimal),
    Apply(LoanApplication),
    Authorize(LoanId, LoanDecision),
    Repay(LoanId, Decimal),
}

impl CsvRecord {
    /// Converts a CSV record to an operation.
    ///
    /// Returns `None` for unknown operation types or missing required fields.
    fn into_operation(self) -> Option<Operation> {
        let subject = self.subject;

        match self.op.to_lowercase().as_str() {
            "open" => Some(Operation::Open(UserId(subject))),
            "close" => Some(Operation::Close(AccountId(subject))),
            "deposit" => Some(Operation::Deposit(AccountId(subject), self.amount?)),
            "withdraw" | "withdrawal" => {
                Some(Operation::Withdraw(AccountId(subject), self.amount?))
            }
            "transfer" => Some(Operation::Transfer(
                AccountId(subject),
                AccountId(self.counterparty?),
                self.amount?,
            )),
            "apply" => Some(Operation::Apply(LoanApplication {
                user_id: UserId(subject),
                principal: self.amount?,
                interest_rate: self.rate?,
                term_months: self.term?,
            })),
            "approve" => Some(Operation::Authorize(
                LoanId(subject),
                LoanDecision::Approve {
                    disburse_to: self.counterparty.map(AccountId),
                },
            )),
            "reject" => Some(Operation::Authorize(LoanId(subject), LoanDecision::Reject)),
            "repay" => Some(Operation::Repay(LoanId(subject), self.amount?)),
            _ => None,
        }
    }
}

fn apply(engine: &Engine, operation: Operation) -> Result<(), LedgerError> {
    match operation {
        Operation::Open(user) => engine.open_account(user).map(drop),
        Operation::Close(account) => engine.close_account(account).map(drop),
        Operation::Deposit(account, amount) => engine.deposit(account, amount).map(drop),
        Operation::Withdraw(account, amount) => engine.withdraw(account, amount).map(drop),
        Operation::Transfer(from, to, amount) => engine.transfer(from, to, amount).map(drop),
        Operation::Apply(application) => engine.apply_for_loan(application).map(drop),
        Operation::Authorize(loan, decision) => engine.authorize_loan(loan, decision).map(drop),
        Operation::Repay(loan, amount) => engine.repay_loan(loan, amount).map(drop),
    }
}

/// Process operations from a CSV reader.
///
/// Rows are streamed, so arbitrarily large files are handled without
/// loading them into memory. Malformed rows and rejected operations are
/// logged and skipped.
///
/// # CSV Format
///
/// ```csv
/// type,subject,counterparty,amount,rate,term
/// open,1,,,,
/// open,2,,,,
/// deposit,1,,100.0,,
/// transfer,1,2,25.0,,
/// apply,1,,1000,5.0,12
/// approve,1,2,,,
/// repay,1,,200,,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the header is invalid.
fn process_operations<R: Read>(reader: R) -> Result<Engine, csv::Error> {
    let engine = Engine::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true) // Trailing optional columns may be omitted
        .has_headers(true)
        .from_reader(reader);

    let mut applied = 0usize;
    let mut skipped = 0usize;

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row = line + 1, error = %e, "skipping malformed row");
                skipped += 1;
                continue;
            }
        };

        let Some(operation) = record.into_operation() else {
            warn!(row = line + 1, "skipping invalid operation record");
            skipped += 1;
            continue;
        };

        match apply(&engine, operation) {
            Ok(()) => applied += 1,
            Err(e) => {
                warn!(row = line + 1, code = e.code(), error = %e, "operation rejected");
                skipped += 1;
            }
        }
    }

    info!(applied, skipped, "replay finished");
    Ok(engine)
}

/// Write open accounts as CSV.
///
/// Columns: `account, user, balance`
fn write_accounts<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for account in engine.store().accounts() {
        wtr.serialize(&account)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write loans as CSV.
///
/// Columns: `loan, user, principal, interest_rate, term_months, status, outstanding`
fn write_loans<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for loan in engine.store().loans() {
        wtr.serialize(&loan)?;
    }
    wtr.flush()?;
    Ok(())
}

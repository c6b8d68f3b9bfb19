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

//! Ledger entries.
//!
//! Every committed balance change leaves exactly one entry per affected
//! account. Entries are immutable: the store keeps them behind an `Arc` and
//! never hands out mutable access.

use crate::base::{AccountId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    TransferOut,
    TransferIn,
}

impl EntryKind {
    /// Whether this kind of entry increases the account balance.
    pub fn is_credit(self) -> bool {
        matches!(self, EntryKind::Deposit | EntryKind::TransferIn)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::TransferOut => "transfer-out",
            EntryKind::TransferIn => "transfer-in",
        };
        f.write_str(name)
    }
}

/// An entry computed by a balance operation, not yet assigned an ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub kind: EntryKind,
    /// Positive magnitude; the direction comes from `kind`.
    pub amount: Decimal,
    pub description: String,
}

/// A committed ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(id: TransactionId, entry: NewEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            account_id: entry.account_id,
            kind: entry.kind,
            amount: entry.amount,
            description: entry.description,
            created_at,
        }
    }

    /// Amount with the entry's direction applied: credits positive, debits
    /// negative. Summing this over an account's history yields its balance.
    pub fn signed_amount(&self) -> Decimal {
        if self.kind.is_credit() {
            self.amount
        } else {
            -self.amount
        }
    }
}

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

//! Account snapshots.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use rust_decimal_macros::dec;
//! use bank_ledger::{Account, AccountId, UserId};
//!
//! let account = Account::new(AccountId(1), UserId(7), Utc::now());
//! assert_eq!(account.balance, dec!(0));
//! assert!(!account.is_closed());
//! ```

use crate::base::{AccountId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Ledger account.
///
/// A plain value: the store owns the durable row and hands out copies. The
/// balance is only ever changed by a balance operation whose result is
/// committed through a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Closed accounts are invisible to every operation.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    const DECIMAL_PRECISION: u32 = 4;

    /// Opens an empty account.
    pub fn new(id: AccountId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub(crate) fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: balance went negative: {}",
            self.balance
        );
    }
}

impl Serialize for Account {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Account", 3)?;
        state.serialize_field("account", &self.id)?;
        state.serialize_field("user", &self.user_id)?;
        state.serialize_field(
            "balance",
            &self.balance.round_dp(Account::DECIMAL_PRECISION),
        )?;
        state.end()
    }
}

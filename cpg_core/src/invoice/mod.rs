// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The invoice entity: the unit of work of the gateway.
//!
//! An invoice is created once, persisted immutably except for its four
//! status timestamps and checkout bookkeeping, and never physically deleted;
//! expiry is a computed status, not a deletion. The wallet-derivation secret
//! lives in `encrypted_salt`, opaque to everything but the salt keyring.

mod status;

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
pub use status::InvoiceStatus;

use crate::{keyring::KeyRing, Error, Result};

/// Exclusive upper bound on invoice metadata length, in bytes.
pub const MAX_METADATA_LEN: usize = 256;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub asset: String,
    pub min_amount: U256,
    pub recipient: String,
    pub beneficiary: String,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub wallet_address: String,
    pub encrypted_salt: Vec<u8>,
    pub auto_checkout: bool,
    pub fill_at: Option<DateTime<Utc>>,
    pub cancel_at: Option<DateTime<Utc>>,
    pub checkout_request_at: Option<DateTime<Utc>>,
    pub last_checkout_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Derives the status at `now`. Pure over the four optional timestamps
    /// and the deadline: re-evaluating without mutation yields the same
    /// result for the same `now`.
    pub fn status_at(&self, now: DateTime<Utc>) -> InvoiceStatus {
        if self.fill_at.is_some() && self.cancel_at.is_some() {
            return InvoiceStatus::Invalid;
        }
        if self.last_checkout_at.is_some() {
            return InvoiceStatus::Checkout;
        }
        if self.fill_at.is_some() {
            return InvoiceStatus::Filled;
        }
        if self.cancel_at.is_some() {
            return InvoiceStatus::Canceled;
        }
        if self.deadline > now {
            InvoiceStatus::Pending
        } else {
            InvoiceStatus::Expired
        }
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status_at(Utc::now())
    }

    /// Selects the sweep destination for the status at `now`: the
    /// beneficiary on the refund path (`Expired`/`Canceled`), the recipient
    /// on the payment path. An `Invalid` status is a programming-logic
    /// failure, surfaced as a typed error.
    pub fn destination_at(&self, now: DateTime<Utc>) -> Result<&str> {
        match self.status_at(now) {
            InvoiceStatus::Expired | InvoiceStatus::Canceled => Ok(&self.beneficiary),
            InvoiceStatus::Filled | InvoiceStatus::Pending | InvoiceStatus::Checkout => {
                Ok(&self.recipient)
            }
            InvoiceStatus::Invalid => Err(Error::InvalidInvoiceStatus),
        }
    }

    /// Decrypts the per-invoice wallet-derivation salt. `None` when the salt
    /// column was not projected or the ring holds no matching key.
    pub fn decrypt_salt(&self, salt_keyring: &KeyRing) -> Option<Vec<u8>> {
        if self.encrypted_salt.is_empty() {
            return None;
        }
        salt_keyring.decrypt(&self.encrypted_salt)
    }

    /// Encrypts a full snapshot of the invoice for client-side backup. The
    /// ciphertext is the sole externally held recovery credential.
    pub fn encrypt_backup(&self, backup_keyring: &KeyRing) -> Result<Vec<u8>> {
        let snapshot = serde_json::to_vec(self).map_err(|err| Error::StoreError {
            source_error: anyhow::Error::new(err),
        })?;
        Ok(backup_keyring.seal(&snapshot))
    }

    /// Decrypts and unpacks a backup snapshot. `None` when no retained key
    /// authenticates the ciphertext or the payload does not parse.
    pub fn decrypt_backup(backup_keyring: &KeyRing, encrypted: &[u8]) -> Option<Invoice> {
        let snapshot = backup_keyring.decrypt(encrypted)?;
        serde_json::from_slice(&snapshot).ok()
    }
}

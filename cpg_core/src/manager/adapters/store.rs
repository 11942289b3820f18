// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::invoice::Invoice;

/// Result of a conditional update.
///
/// `PreconditionFailed` means the row exists but the guard predicate no
/// longer holds (another writer already won the transition). It is distinct
/// from `NotFound` so callers can tell a lost race from a bad id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    PreconditionFailed,
    NotFound,
}

/// Durable invoice persistence.
///
/// Every mutating operation is a conditional update: the new value and a
/// predicate over the current row travel together, and the store applies
/// them atomically (compare-and-swap on the row, e.g. an SQL `UPDATE ...
/// WHERE` affecting exactly one row). This is the whole concurrency story:
/// two callers racing the same transition have exactly one `Updated`
/// outcome between them, with no lock manager involved. A guard must either
/// fully apply or not at all; partial writes are a contract violation.
///
/// The deadline comparisons below use the write instant `at`, so the
/// effective transition sequence for one invoice id stays consistent with
/// the status derivation regardless of interleaving.
#[async_trait]
pub trait InvoiceStore {
    /// User-specified error type for store failures (connectivity, SQL, ...).
    type AdapterError: std::error::Error + std::fmt::Debug + Send + Sync + 'static;

    /// Inserts a freshly created or recovered invoice row. The encrypted
    /// salt column is write-once; a duplicate id is an adapter error.
    async fn insert_invoice(
        &self,
        invoice: &Invoice,
        recovered: bool,
    ) -> Result<(), Self::AdapterError>;

    /// Looks an invoice up by id and/or wallet address (every provided
    /// reference must match). The encrypted salt is excluded from the
    /// projection unless `with_salt` is set, so the private material is
    /// only ever loaded by operations that need it.
    async fn invoice_by_ref(
        &self,
        id: Option<&str>,
        wallet_address: Option<&str>,
        with_salt: bool,
    ) -> Result<Option<Invoice>, Self::AdapterError>;

    /// Sets `cancel_at = at` iff the deadline has not passed and none of
    /// fill/cancel/last-checkout is set.
    async fn set_cancel_at(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Self::AdapterError>;

    /// Sets `fill_at = at` under the same guard as [`Self::set_cancel_at`].
    /// The mutual guard is what keeps fill and cancel mutually exclusive.
    async fn set_fill_at(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Self::AdapterError>;

    /// Sets `checkout_request_at = at` iff no request is pending and the
    /// invoice is in a terminal-for-sweep status (deadline passed, filled,
    /// or canceled).
    async fn set_checkout_request_at(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Self::AdapterError>;

    /// Sets `last_checkout_at = at` iff the invoice is in a terminal-for-
    /// sweep status.
    async fn set_last_checkout_at(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Self::AdapterError>;

    /// Like [`Self::set_checkout_request_at`] but only fires for invoices
    /// created with the auto-checkout flag. A `PreconditionFailed` outcome
    /// is the expected no-op, not a fault.
    async fn try_set_auto_checkout(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Self::AdapterError>;
}

// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Derived invoice status.
//!
//! Status is never stored; it is recomputed from the timestamp combination
//! on every read. The only way an invoice "moves" is through the store's
//! guarded timestamp writes.

use serde::{Deserialize, Serialize};

/// The lifecycle states of an invoice.
///
/// `Invalid` covers the both-fill-and-cancel timestamp combination; the
/// store's mutual-exclusion predicates make it unreachable through live
/// code paths, so seeing it means the row was corrupted out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum InvoiceStatus {
    Invalid,
    Pending,
    Filled,
    Expired,
    Canceled,
    Checkout,
}

impl InvoiceStatus {
    /// Whether a sweep may be attempted from this status.
    pub fn is_terminal_for_sweep(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Expired
                | InvoiceStatus::Canceled
                | InvoiceStatus::Filled
                | InvoiceStatus::Checkout
        )
    }
}

// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The gateway orchestrator and its pluggable context.
//!
//! [`Gateway`] is the primary interface of the crate: it owns the use-case
//! operations (create, recover, cancel, request-checkout, check,
//! try-checkout) and delegates chain-specific work to the registered
//! [`adapters::Asset`] and persistence to the [`adapters::InvoiceStore`].
//! It is stateless and safe for unbounded concurrent invocation; all
//! cross-request coordination lives in the store's conditional updates.

pub mod adapters;
#[cfg(feature = "in_memory")]
pub mod context;
mod gateway;

pub use gateway::{
    CancelInvoiceParams, CheckInvoiceParams, CheckInvoiceResult, CreateInvoiceParams,
    CreateInvoiceResult, Gateway, GetInvoiceParams, GetInvoiceResult, RecoverInvoiceParams,
    RequestCheckoutParams, TryCheckoutInvoiceParams,
};

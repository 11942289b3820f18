// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Context adapters for the gateway.
//!
//! Each adapter is implemented by the embedder for their concrete chain,
//! datastore and coordination backend. The gateway only ever talks to these
//! traits, which keeps the lifecycle engine independent of any single
//! blockchain client or SQL dialect.

mod asset;
mod ratelimit;
mod store;

pub use asset::{Asset, AssetFactory, AssetInfo};
pub use ratelimit::RateLimiter;
pub use store::{InvoiceStore, UpdateOutcome};

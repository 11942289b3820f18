// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use async_trait::async_trait;

/// Guard against duplicate in-flight operations on the same invoice.
///
/// Semantics are set-if-absent with expiry (Redis `SET NX PX`): `acquire`
/// returns `true` when the key was free and the lease is now held, `false`
/// when another operation holds it. There is no release; leases simply
/// expire.
///
/// The transport layer consults this before dispatching an operation and
/// maps a `false` to a resource-exhausted signal. It is an optimization
/// layered on top of the store's conditional updates, never a substitute
/// for them.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn acquire(&self, key: &str, lease: Duration) -> anyhow::Result<bool>;
}

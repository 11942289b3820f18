// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, time::Duration};

use alloy_primitives::U256;
use async_trait::async_trait;

use crate::invoice::Invoice;

/// Static descriptor of a registered asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetInfo {
    /// Minimum delay between successive chain polls for one invoice.
    pub min_delay: Duration,
    /// Byte length of the salt this asset's wallet-derivation requires.
    pub salt_length: usize,
}

/// Chain-specific behavior, implemented once per supported blockchain.
///
/// Contract requirements beyond the signatures:
///
/// - `prepare_invoice` must be deterministic over the salt: the same salt
///   always yields the same wallet address, which is what makes recovery
///   from a client-held backup possible.
/// - `try_flush` must re-validate chain conditions (fee ceilings and the
///   like) before every sweep; an implementation that cannot do so must not
///   be registered.
/// - Implementations own the network I/O and should bound each outbound
///   call; the gateway additionally applies its own per-call timeout.
#[async_trait]
pub trait Asset: Send + Sync {
    fn info(&self) -> AssetInfo;

    /// Validates recipient/beneficiary address syntax and the salt length
    /// against [`AssetInfo::salt_length`], then derives and assigns the
    /// deposit wallet address from the salt.
    async fn prepare_invoice(&self, invoice: &mut Invoice, salt: &[u8]) -> anyhow::Result<()>;

    /// Queries the chain for the current balance of the invoice's deposit
    /// wallet.
    async fn get_balance(&self, invoice: &Invoice) -> anyhow::Result<U256>;

    /// Sweeps the collected funds (balance minus fee) to `destination`,
    /// re-deriving the wallet's private material from the salt.
    async fn try_flush(
        &self,
        invoice: &Invoice,
        salt: &[u8],
        destination: &str,
    ) -> anyhow::Result<()>;
}

/// Constructs an [`Asset`] from its entry in the assets config mapping.
///
/// Factories are registered by name in a [`crate::registry::FactoryRegistry`]
/// at process start, before any invoice operation runs.
#[async_trait]
pub trait AssetFactory: Send + Sync {
    /// The `type` value config entries use to select this factory.
    fn name(&self) -> &str;

    /// Decodes the factory-specific fields of `config` and builds the asset.
    /// Malformed config or an unreachable chain endpoint is an error; the
    /// caller aborts the whole parse on it.
    async fn build(&self, config: serde_json::Value) -> anyhow::Result<Arc<dyn Asset>>;
}

// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory context implementation for the gateway.
//!
//! Provides an [`InMemoryContext`] invoice store, a [`MockAsset`] chain and
//! in-memory rate limiters. Useful for testing and development; the store
//! honors the same conditional-update contract a relational backend would,
//! applying every guard atomically under a single write guard.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, RwLock},
    time::{Duration, Instant},
};

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
    invoice::Invoice,
    manager::adapters::{Asset, AssetFactory, AssetInfo, InvoiceStore, RateLimiter, UpdateOutcome},
};

#[derive(Debug, Error)]
pub enum InMemoryError {
    #[error("something went wrong: {error}")]
    AdapterError { error: String },
}

type InvoiceRows = Arc<RwLock<HashMap<String, Invoice>>>;

/// In-memory invoice store. Cloneable so tests can share it with the
/// gateway and inspect rows directly.
#[derive(Clone, Default)]
pub struct InMemoryContext {
    rows: InvoiceRows,
    recovered: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row directly, bypassing every guard. Test-side tooling for
    /// simulating states the live paths cannot produce.
    pub fn insert_raw(&self, invoice: Invoice) {
        self.rows.write().unwrap().insert(invoice.id.clone(), invoice);
    }

    pub fn row(&self, id: &str) -> Option<Invoice> {
        self.rows.read().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().unwrap().is_empty()
    }

    pub fn is_recovered(&self, id: &str) -> bool {
        self.recovered.read().unwrap().contains(id)
    }

    /// Runs a guarded update under the write lock: the predicate and the
    /// write apply atomically, like a one-row conditional `UPDATE`.
    fn conditional_update(
        &self,
        id: &str,
        guard: impl Fn(&Invoice) -> bool,
        apply: impl Fn(&mut Invoice),
    ) -> UpdateOutcome {
        let mut rows = self.rows.write().unwrap();
        match rows.get_mut(id) {
            None => UpdateOutcome::NotFound,
            Some(row) if guard(row) => {
                apply(row);
                UpdateOutcome::Updated
            }
            Some(_) => UpdateOutcome::PreconditionFailed,
        }
    }
}

/// Deadline not passed and no terminal timestamp set: the shared guard that
/// keeps fill and cancel mutually exclusive.
fn still_pending(row: &Invoice, at: DateTime<Utc>) -> bool {
    row.deadline > at
        && row.fill_at.is_none()
        && row.cancel_at.is_none()
        && row.last_checkout_at.is_none()
}

/// Deadline passed, filled, or canceled.
fn terminal_for_sweep(row: &Invoice, at: DateTime<Utc>) -> bool {
    row.deadline < at || row.fill_at.is_some() || row.cancel_at.is_some()
}

#[async_trait]
impl InvoiceStore for InMemoryContext {
    type AdapterError = InMemoryError;

    async fn insert_invoice(
        &self,
        invoice: &Invoice,
        recovered: bool,
    ) -> Result<(), Self::AdapterError> {
        let mut rows = self.rows.write().unwrap();
        if rows.contains_key(&invoice.id) {
            return Err(InMemoryError::AdapterError {
                error: format!("invoice {} already exists", invoice.id),
            });
        }
        rows.insert(invoice.id.clone(), invoice.clone());
        if recovered {
            self.recovered.write().unwrap().insert(invoice.id.clone());
        }
        Ok(())
    }

    async fn invoice_by_ref(
        &self,
        id: Option<&str>,
        wallet_address: Option<&str>,
        with_salt: bool,
    ) -> Result<Option<Invoice>, Self::AdapterError> {
        if id.is_none() && wallet_address.is_none() {
            return Err(InMemoryError::AdapterError {
                error: "no invoice id or wallet address".to_owned(),
            });
        }
        let rows = self.rows.read().unwrap();
        let found = rows.values().find(|row| {
            id.is_none_or(|id| row.id == id)
                && wallet_address.is_none_or(|wallet| row.wallet_address == wallet)
        });
        Ok(found.cloned().map(|mut row| {
            if !with_salt {
                row.encrypted_salt.clear();
            }
            row
        }))
    }

    async fn set_cancel_at(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Self::AdapterError> {
        Ok(self.conditional_update(
            id,
            |row| still_pending(row, at),
            |row| row.cancel_at = Some(at),
        ))
    }

    async fn set_fill_at(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Self::AdapterError> {
        Ok(self.conditional_update(
            id,
            |row| still_pending(row, at),
            |row| row.fill_at = Some(at),
        ))
    }

    async fn set_checkout_request_at(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Self::AdapterError> {
        Ok(self.conditional_update(
            id,
            |row| row.checkout_request_at.is_none() && terminal_for_sweep(row, at),
            |row| row.checkout_request_at = Some(at),
        ))
    }

    async fn set_last_checkout_at(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Self::AdapterError> {
        Ok(self.conditional_update(
            id,
            |row| terminal_for_sweep(row, at),
            |row| row.last_checkout_at = Some(at),
        ))
    }

    async fn try_set_auto_checkout(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<UpdateOutcome, Self::AdapterError> {
        Ok(self.conditional_update(
            id,
            |row| {
                row.auto_checkout
                    && row.checkout_request_at.is_none()
                    && terminal_for_sweep(row, at)
            },
            |row| row.checkout_request_at = Some(at),
        ))
    }
}

/// A sweep recorded by the mock chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sweep {
    pub from: String,
    pub to: String,
    pub amount: U256,
}

pub const MOCK_SALT_LEN: usize = 32;

/// Mock chain: balances are set by tests, sweeps are recorded instead of
/// broadcast, and wallet derivation is a hash of the salt so the same salt
/// always lands on the same address.
#[derive(Clone)]
pub struct MockAsset {
    min_delay: Duration,
    max_allowed_fee: U256,
    current_fee: Arc<RwLock<U256>>,
    balances: Arc<RwLock<HashMap<String, U256>>>,
    sweeps: Arc<RwLock<Vec<Sweep>>>,
}

impl MockAsset {
    pub fn new(min_delay: Duration, max_allowed_fee: U256) -> Self {
        Self {
            min_delay,
            max_allowed_fee,
            current_fee: Arc::new(RwLock::new(U256::ZERO)),
            balances: Arc::new(RwLock::new(HashMap::new())),
            sweeps: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn set_balance(&self, wallet_address: &str, balance: U256) {
        self.balances
            .write()
            .unwrap()
            .insert(wallet_address.to_owned(), balance);
    }

    /// Simulates a fee-market move; flushes fail while the fee sits above
    /// the configured ceiling.
    pub fn set_current_fee(&self, fee: U256) {
        *self.current_fee.write().unwrap() = fee;
    }

    pub fn sweeps(&self) -> Vec<Sweep> {
        self.sweeps.read().unwrap().clone()
    }

    fn derive_wallet_address(salt: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"mock-wallet-v1");
        hasher.update(salt);
        let digest = hasher.finalize();
        format!("0x{}", hex::encode(&digest[..20]))
    }

    fn validate_address(address: &str) -> bool {
        address.len() == 42
            && address.starts_with("0x")
            && address[2..].bytes().all(|b| b.is_ascii_hexdigit())
    }
}

#[async_trait]
impl Asset for MockAsset {
    fn info(&self) -> AssetInfo {
        AssetInfo {
            min_delay: self.min_delay,
            salt_length: MOCK_SALT_LEN,
        }
    }

    async fn prepare_invoice(&self, invoice: &mut Invoice, salt: &[u8]) -> anyhow::Result<()> {
        if !Self::validate_address(&invoice.recipient) {
            anyhow::bail!("invalid recipient address");
        }
        if !Self::validate_address(&invoice.beneficiary) {
            anyhow::bail!("invalid beneficiary address");
        }
        if salt.len() != MOCK_SALT_LEN {
            anyhow::bail!("invalid salt size: {}", salt.len());
        }
        invoice.wallet_address = Self::derive_wallet_address(salt);
        Ok(())
    }

    async fn get_balance(&self, invoice: &Invoice) -> anyhow::Result<U256> {
        Ok(self
            .balances
            .read()
            .unwrap()
            .get(&invoice.wallet_address)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn try_flush(
        &self,
        invoice: &Invoice,
        salt: &[u8],
        destination: &str,
    ) -> anyhow::Result<()> {
        let fee = *self.current_fee.read().unwrap();
        if fee > self.max_allowed_fee {
            anyhow::bail!("fee {fee} above the allowed ceiling {}", self.max_allowed_fee);
        }
        if salt.len() != MOCK_SALT_LEN {
            anyhow::bail!("invalid salt size: {}", salt.len());
        }
        // Re-derive from the salt rather than trusting the stored column.
        let wallet_address = Self::derive_wallet_address(salt);
        if wallet_address != invoice.wallet_address {
            anyhow::bail!("salt does not derive the invoice wallet");
        }

        let mut balances = self.balances.write().unwrap();
        let balance = balances.get(&wallet_address).copied().unwrap_or(U256::ZERO);
        if balance <= fee {
            anyhow::bail!("fee overcomes the wallet balance");
        }
        balances.insert(wallet_address.clone(), U256::ZERO);
        self.sweeps.write().unwrap().push(Sweep {
            from: wallet_address,
            to: destination.to_owned(),
            amount: balance - fee,
        });
        Ok(())
    }
}

pub struct MockAssetFactory;

#[derive(Deserialize)]
struct MockAssetConfig {
    min_delay_seconds: u64,
    /// Decimal string, like every amount crossing a config or wire boundary.
    max_allowed_fee: String,
}

#[async_trait]
impl AssetFactory for MockAssetFactory {
    fn name(&self) -> &str {
        "mock"
    }

    async fn build(&self, config: serde_json::Value) -> anyhow::Result<Arc<dyn Asset>> {
        let config: MockAssetConfig = serde_json::from_value(config)?;
        let max_allowed_fee = crate::parse_amount(&config.max_allowed_fee)?;
        Ok(Arc::new(MockAsset::new(
            Duration::from_secs(config.min_delay_seconds),
            max_allowed_fee,
        )))
    }
}

/// Set-if-absent rate limiter backed by a process-local map; leases expire
/// lazily on the next acquire.
#[derive(Default)]
pub struct InMemoryRateLimiter {
    leases: Mutex<HashMap<String, Instant>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn acquire(&self, key: &str, lease: Duration) -> anyhow::Result<bool> {
        if key.is_empty() {
            anyhow::bail!("invalid rate limit key");
        }
        let now = Instant::now();
        let mut leases = self.leases.lock().unwrap();
        leases.retain(|_, expiry| *expiry > now);
        if leases.contains_key(key) {
            return Ok(false);
        }
        leases.insert(key.to_owned(), now + lease);
        Ok(true)
    }
}

/// Limiter that always grants; for deployments that bring their own
/// coordination or accept duplicate in-flight calls.
pub struct NoLimit;

#[async_trait]
impl RateLimiter for NoLimit {
    async fn acquire(&self, key: &str, _lease: Duration) -> anyhow::Result<bool> {
        if key.is_empty() {
            anyhow::bail!("invalid rate limit key");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;

    fn pending_invoice(id: &str) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: id.to_owned(),
            asset: "mock".to_owned(),
            min_amount: U256::from(100u64),
            recipient: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_owned(),
            beneficiary: "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".to_owned(),
            wallet_address: "0xcccccccccccccccccccccccccccccccccccccccc".to_owned(),
            encrypted_salt: vec![1, 2, 3],
            created_at: now,
            deadline: now + ChronoDuration::hours(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fill_and_cancel_are_mutually_exclusive() {
        let store = InMemoryContext::new();
        store.insert_invoice(&pending_invoice("inv"), false).await.unwrap();
        let now = Utc::now();

        assert_eq!(
            store.set_fill_at("inv", now).await.unwrap(),
            UpdateOutcome::Updated
        );
        assert_eq!(
            store.set_cancel_at("inv", now).await.unwrap(),
            UpdateOutcome::PreconditionFailed
        );
        assert_eq!(
            store.set_fill_at("inv", now).await.unwrap(),
            UpdateOutcome::PreconditionFailed
        );
    }

    #[tokio::test]
    async fn updates_on_missing_rows_report_not_found() {
        let store = InMemoryContext::new();
        assert_eq!(
            store.set_fill_at("missing", Utc::now()).await.unwrap(),
            UpdateOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn checkout_request_requires_terminal_status() {
        let store = InMemoryContext::new();
        store.insert_invoice(&pending_invoice("inv"), false).await.unwrap();
        let now = Utc::now();

        assert_eq!(
            store.set_checkout_request_at("inv", now).await.unwrap(),
            UpdateOutcome::PreconditionFailed
        );
        store.set_fill_at("inv", now).await.unwrap();
        assert_eq!(
            store.set_checkout_request_at("inv", now).await.unwrap(),
            UpdateOutcome::Updated
        );
        // Guarded on "not already requested".
        assert_eq!(
            store.set_checkout_request_at("inv", now).await.unwrap(),
            UpdateOutcome::PreconditionFailed
        );
    }

    #[tokio::test]
    async fn auto_checkout_only_fires_for_flagged_invoices() {
        let store = InMemoryContext::new();
        let mut flagged = pending_invoice("flagged");
        flagged.auto_checkout = true;
        flagged.fill_at = Some(Utc::now());
        store.insert_invoice(&flagged, false).await.unwrap();
        let mut plain = pending_invoice("plain");
        plain.fill_at = Some(Utc::now());
        store.insert_invoice(&plain, false).await.unwrap();

        let now = Utc::now();
        assert_eq!(
            store.try_set_auto_checkout("flagged", now).await.unwrap(),
            UpdateOutcome::Updated
        );
        assert_eq!(
            store.try_set_auto_checkout("plain", now).await.unwrap(),
            UpdateOutcome::PreconditionFailed
        );
    }

    #[tokio::test]
    async fn default_projection_excludes_the_salt() {
        let store = InMemoryContext::new();
        store.insert_invoice(&pending_invoice("inv"), false).await.unwrap();

        let without = store
            .invoice_by_ref(Some("inv"), None, false)
            .await
            .unwrap()
            .unwrap();
        assert!(without.encrypted_salt.is_empty());

        let with = store
            .invoice_by_ref(Some("inv"), None, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(with.encrypted_salt, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn lookup_by_wallet_address_matches_the_row() {
        let store = InMemoryContext::new();
        let invoice = pending_invoice("inv");
        store.insert_invoice(&invoice, false).await.unwrap();

        let by_wallet = store
            .invoice_by_ref(None, Some(&invoice.wallet_address), false)
            .await
            .unwrap();
        assert_eq!(by_wallet.unwrap().id, "inv");

        let mismatched = store
            .invoice_by_ref(Some("inv"), Some("0xdddddddddddddddddddddddddddddddddddddddd"), false)
            .await
            .unwrap();
        assert!(mismatched.is_none());
    }

    #[tokio::test]
    async fn mock_wallet_derivation_is_deterministic() {
        let asset = MockAsset::new(Duration::from_secs(1), U256::from(10u64));
        let salt = [7u8; MOCK_SALT_LEN];
        let mut a = pending_invoice("a");
        let mut b = pending_invoice("b");
        asset.prepare_invoice(&mut a, &salt).await.unwrap();
        asset.prepare_invoice(&mut b, &salt).await.unwrap();
        assert_eq!(a.wallet_address, b.wallet_address);
        assert!(MockAsset::validate_address(&a.wallet_address));

        let mut c = pending_invoice("c");
        asset
            .prepare_invoice(&mut c, &[8u8; MOCK_SALT_LEN])
            .await
            .unwrap();
        assert_ne!(a.wallet_address, c.wallet_address);
    }

    #[tokio::test]
    async fn mock_flush_deducts_fee_and_respects_ceiling() {
        let asset = MockAsset::new(Duration::from_secs(1), U256::from(10u64));
        let salt = [7u8; MOCK_SALT_LEN];
        let mut invoice = pending_invoice("inv");
        asset.prepare_invoice(&mut invoice, &salt).await.unwrap();
        asset.set_balance(&invoice.wallet_address, U256::from(100u64));
        asset.set_current_fee(U256::from(3u64));

        asset
            .try_flush(&invoice, &salt, &invoice.recipient)
            .await
            .unwrap();
        let sweeps = asset.sweeps();
        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].amount, U256::from(97u64));
        assert_eq!(sweeps[0].to, invoice.recipient);
        assert_eq!(asset.get_balance(&invoice).await.unwrap(), U256::ZERO);

        // Fee spike above the ceiling blocks further flushes.
        asset.set_balance(&invoice.wallet_address, U256::from(100u64));
        asset.set_current_fee(U256::from(11u64));
        assert!(asset
            .try_flush(&invoice, &salt, &invoice.recipient)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn rate_limiter_holds_and_expires_leases() {
        let limiter = InMemoryRateLimiter::new();
        assert!(limiter
            .acquire("inv", Duration::from_millis(20))
            .await
            .unwrap());
        assert!(!limiter
            .acquire("inv", Duration::from_millis(20))
            .await
            .unwrap());
        // Different key is unaffected.
        assert!(limiter
            .acquire("other", Duration::from_millis(20))
            .await
            .unwrap());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter
            .acquire("inv", Duration::from_millis(20))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn rate_limiter_rejects_empty_keys() {
        let limiter = InMemoryRateLimiter::new();
        assert!(limiter.acquire("", Duration::from_secs(1)).await.is_err());
        assert!(NoLimit.acquire("", Duration::from_secs(1)).await.is_err());
        assert!(NoLimit.acquire("inv", Duration::from_secs(1)).await.unwrap());
    }
}

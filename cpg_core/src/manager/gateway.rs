// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use super::adapters::{Asset, AssetInfo, InvoiceStore, UpdateOutcome};
use crate::{
    invoice::{Invoice, InvoiceStatus, MAX_METADATA_LEN},
    keyring::KeyRing,
    registry::AssetRegistry,
    Error, Result,
};

/// Default bound on a single outbound chain call.
const DEFAULT_CHAIN_CALL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct CreateInvoiceParams {
    pub asset_name: String,
    pub metadata: String,
    pub recipient: String,
    pub beneficiary: String,
    pub auto_checkout: bool,
    pub min_amount: U256,
    pub deadline: DateTime<Utc>,
}

pub struct CreateInvoiceResult {
    pub invoice_id: String,
    /// Opaque recovery credential, held by the client. The gateway does not
    /// retain it.
    pub invoice_backup: Vec<u8>,
}

pub struct RecoverInvoiceParams {
    pub invoice_id: String,
    pub invoice_backup: Vec<u8>,
}

pub struct CancelInvoiceParams {
    pub invoice_id: String,
    /// Confirmation token (typo defense), matched against the stored wallet
    /// address. Not an authorization credential.
    pub wallet_address: String,
}

pub struct RequestCheckoutParams {
    pub invoice_id: String,
}

pub struct GetInvoiceParams {
    pub invoice_id: String,
}

/// Public projection of an invoice: every column except the encrypted salt,
/// plus the derived status.
pub struct GetInvoiceResult {
    pub asset: String,
    pub min_amount: U256,
    pub recipient: String,
    pub beneficiary: String,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub wallet_address: String,
    pub auto_checkout: bool,
    pub fill_at: Option<DateTime<Utc>>,
    pub cancel_at: Option<DateTime<Utc>>,
    pub checkout_request_at: Option<DateTime<Utc>>,
    pub last_checkout_at: Option<DateTime<Utc>>,
    pub status: InvoiceStatus,
}

/// Identifies the invoice by id, wallet address, or both; empty strings are
/// treated as absent, every provided reference must match.
pub struct CheckInvoiceParams {
    pub invoice_id: String,
    pub wallet_address: String,
}

pub struct CheckInvoiceResult {
    pub status: InvoiceStatus,
}

pub struct TryCheckoutInvoiceParams {
    pub invoice_id: String,
}

/// The invoice lifecycle orchestrator.
///
/// Holds no long-lived lock and no mutable state beyond the read-only asset
/// registry; every state transition goes through the store's conditional
/// updates, so concurrent gateway instances over the same store are safe.
pub struct Gateway<S> {
    assets: AssetRegistry,
    store: S,
    salt_keyring: KeyRing,
    backup_keyring: KeyRing,
    chain_call_timeout: Duration,
}

impl<S> Gateway<S>
where
    S: InvoiceStore + Send + Sync,
{
    /// Builds a gateway. The salt and backup keyrings must be operationally
    /// distinct; shared key material is logged as a warning but does not
    /// alter behavior.
    pub fn new(
        assets: AssetRegistry,
        store: S,
        salt_keyring: KeyRing,
        backup_keyring: KeyRing,
    ) -> Self {
        if salt_keyring.shares_key_with(&backup_keyring) {
            warn!("salt and backup keyrings share at least one key");
        }
        Self {
            assets,
            store,
            salt_keyring,
            backup_keyring,
            chain_call_timeout: DEFAULT_CHAIN_CALL_TIMEOUT,
        }
    }

    /// Overrides the per-call bound applied to balance queries and flushes.
    pub fn with_chain_call_timeout(mut self, timeout: Duration) -> Self {
        self.chain_call_timeout = timeout;
        self
    }

    /// Descriptors of every registered asset.
    pub fn list_assets(&self) -> HashMap<String, AssetInfo> {
        self.assets
            .infos()
            .map(|(name, info)| (name.to_owned(), info))
            .collect()
    }

    pub async fn create_invoice(&self, params: CreateInvoiceParams) -> Result<CreateInvoiceResult> {
        if params.beneficiary == params.recipient {
            return Err(Error::SameRecipientAndBeneficiary);
        }
        if params.min_amount == U256::ZERO {
            return Err(Error::NonPositiveMinAmount);
        }
        if params.metadata.len() >= MAX_METADATA_LEN {
            return Err(Error::MetadataTooLarge {
                length: params.metadata.len(),
            });
        }
        let now = Utc::now();
        if params.deadline <= now {
            return Err(Error::PastDeadline);
        }
        let asset = self.asset(&params.asset_name)?;
        let info = asset.info();

        let salt = random_bytes(info.salt_length);
        let mut invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            asset: params.asset_name.clone(),
            min_amount: params.min_amount,
            recipient: params.recipient,
            beneficiary: params.beneficiary,
            metadata: params.metadata,
            created_at: now,
            deadline: params.deadline,
            auto_checkout: params.auto_checkout,
            encrypted_salt: self.salt_keyring.seal(&salt),
            ..Default::default()
        };

        asset
            .prepare_invoice(&mut invoice, &salt)
            .await
            .map_err(|source_error| Error::AssetError {
                asset: params.asset_name.clone(),
                source_error,
            })?;
        if invoice.wallet_address.is_empty() {
            return Err(Error::WalletNotDerived);
        }

        let invoice_backup = invoice.encrypt_backup(&self.backup_keyring)?;

        self.store
            .insert_invoice(&invoice, false)
            .await
            .map_err(store_error)?;

        Ok(CreateInvoiceResult {
            invoice_id: invoice.id,
            invoice_backup,
        })
    }

    /// Rebuilds an invoice row from a client-held encrypted backup, for use
    /// after datastore loss. Every recovery check is evaluated before any of
    /// them is acted on, and all failures collapse into the same
    /// [`Error::BackupRecovery`], so the response does not reveal which
    /// check failed.
    pub async fn recover_invoice(&self, params: RecoverInvoiceParams) -> Result<()> {
        let recovered = Invoice::decrypt_backup(&self.backup_keyring, &params.invoice_backup);
        let decrypt_failed = recovered.is_none();
        let mut invoice = recovered.unwrap_or_default();

        if any_check_failed([
            decrypt_failed,
            invoice.id != params.invoice_id,
            invoice.min_amount == U256::ZERO,
            invoice.metadata.len() >= MAX_METADATA_LEN,
            invoice.deadline <= invoice.created_at,
            invoice.recipient == invoice.beneficiary,
        ]) {
            return Err(Error::BackupRecovery);
        }

        let asset_name = invoice.asset.clone();
        let asset = self.asset(&asset_name)?;

        // Re-derivation from the decrypted salt must land on the original
        // deposit address; the asset contract guarantees determinism.
        let salt = invoice.decrypt_salt(&self.salt_keyring).unwrap_or_default();
        asset
            .prepare_invoice(&mut invoice, &salt)
            .await
            .map_err(|source_error| Error::AssetError {
                asset: asset_name,
                source_error,
            })?;

        self.store
            .insert_invoice(&invoice, true)
            .await
            .map_err(store_error)?;

        self.try_auto_checkout(&invoice.id).await
    }

    pub async fn cancel_invoice(&self, params: CancelInvoiceParams) -> Result<()> {
        if params.invoice_id.is_empty() {
            return Err(Error::EmptyInvoiceId);
        }
        if params.wallet_address.is_empty() {
            return Err(Error::EmptyWalletAddress);
        }

        let invoice = self
            .load_invoice(
                Some(&params.invoice_id),
                Some(&params.wallet_address),
                false,
            )
            .await?;

        match invoice.status() {
            InvoiceStatus::Pending => {}
            status if status.is_terminal_for_sweep() => {
                return Err(Error::StatusConflict { status });
            }
            _ => return Err(Error::InvalidInvoiceStatus),
        }

        match self
            .store
            .set_cancel_at(&params.invoice_id, Utc::now())
            .await
            .map_err(store_error)?
        {
            UpdateOutcome::Updated => {}
            UpdateOutcome::PreconditionFailed => return Err(Error::PreconditionFailed),
            UpdateOutcome::NotFound => return Err(Error::InvoiceNotFound),
        }

        self.try_auto_checkout(&params.invoice_id).await
    }

    pub async fn request_checkout(&self, params: RequestCheckoutParams) -> Result<()> {
        if params.invoice_id.is_empty() {
            return Err(Error::EmptyInvoiceId);
        }

        let invoice = self
            .load_invoice(Some(&params.invoice_id), None, false)
            .await?;

        if invoice.checkout_request_at.is_some() {
            return Err(Error::CheckoutAlreadyRequested);
        }

        match invoice.status() {
            status if status.is_terminal_for_sweep() => {}
            InvoiceStatus::Pending => {
                return Err(Error::StatusConflict {
                    status: InvoiceStatus::Pending,
                });
            }
            _ => return Err(Error::InvalidInvoiceStatus),
        }

        match self
            .store
            .set_checkout_request_at(&params.invoice_id, Utc::now())
            .await
            .map_err(store_error)?
        {
            UpdateOutcome::Updated => Ok(()),
            UpdateOutcome::PreconditionFailed => Err(Error::PreconditionFailed),
            UpdateOutcome::NotFound => Err(Error::InvoiceNotFound),
        }
    }

    pub async fn get_invoice(&self, params: GetInvoiceParams) -> Result<GetInvoiceResult> {
        if params.invoice_id.is_empty() {
            return Err(Error::EmptyInvoiceId);
        }

        let invoice = self
            .load_invoice(Some(&params.invoice_id), None, false)
            .await?;

        let status = invoice.status();
        Ok(GetInvoiceResult {
            asset: invoice.asset,
            min_amount: invoice.min_amount,
            recipient: invoice.recipient,
            beneficiary: invoice.beneficiary,
            metadata: invoice.metadata,
            created_at: invoice.created_at,
            deadline: invoice.deadline,
            wallet_address: invoice.wallet_address,
            auto_checkout: invoice.auto_checkout,
            fill_at: invoice.fill_at,
            cancel_at: invoice.cancel_at,
            checkout_request_at: invoice.checkout_request_at,
            last_checkout_at: invoice.last_checkout_at,
            status,
        })
    }

    /// Polls a `Pending` invoice: when the on-chain balance has reached the
    /// minimum amount, records fill-at through the guarded conditional
    /// update; exactly one of any number of concurrent callers wins that
    /// write. Terminal statuses are reported as-is with no side effect.
    pub async fn check_invoice(&self, params: CheckInvoiceParams) -> Result<CheckInvoiceResult> {
        let id = not_empty(&params.invoice_id);
        let wallet_address = not_empty(&params.wallet_address);
        if id.is_none() && wallet_address.is_none() {
            return Err(Error::EmptyInvoiceId);
        }

        let invoice = self.load_invoice(id, wallet_address, false).await?;
        let asset = self.asset(&invoice.asset)?;

        let status = match invoice.status() {
            status if status.is_terminal_for_sweep() => status,
            InvoiceStatus::Pending => {
                let balance = self
                    .bounded(&invoice.asset, asset.get_balance(&invoice))
                    .await?;
                if balance < invoice.min_amount {
                    return Ok(CheckInvoiceResult {
                        status: InvoiceStatus::Pending,
                    });
                }
                match self
                    .store
                    .set_fill_at(&invoice.id, Utc::now())
                    .await
                    .map_err(store_error)?
                {
                    UpdateOutcome::Updated => InvoiceStatus::Filled,
                    UpdateOutcome::PreconditionFailed => return Err(Error::PreconditionFailed),
                    UpdateOutcome::NotFound => return Err(Error::InvoiceNotFound),
                }
            }
            _ => return Err(Error::InvalidInvoiceStatus),
        };

        self.try_auto_checkout(&invoice.id).await?;

        Ok(CheckInvoiceResult { status })
    }

    /// Executes the sweep for an invoice whose checkout has been requested
    /// and whose requested instant has already elapsed. Only legal from a
    /// terminal-for-sweep status: the sweep destination is derived from the
    /// status that holds now, never from `Pending`.
    pub async fn try_checkout_invoice(&self, params: TryCheckoutInvoiceParams) -> Result<()> {
        if params.invoice_id.is_empty() {
            return Err(Error::EmptyInvoiceId);
        }

        let invoice = self
            .load_invoice(Some(&params.invoice_id), None, true)
            .await?;

        let requested_at = invoice
            .checkout_request_at
            .ok_or(Error::CheckoutNotRequested)?;
        let now = Utc::now();
        if requested_at >= now {
            return Err(Error::CheckoutNotSettled);
        }

        let asset = self.asset(&invoice.asset)?;

        match invoice.status_at(now) {
            status if status.is_terminal_for_sweep() => {}
            InvoiceStatus::Pending => {
                return Err(Error::StatusConflict {
                    status: InvoiceStatus::Pending,
                });
            }
            _ => return Err(Error::InvalidInvoiceStatus),
        }

        let salt = invoice.decrypt_salt(&self.salt_keyring).unwrap_or_default();
        let destination = invoice.destination_at(now)?.to_owned();
        self.bounded(
            &invoice.asset,
            asset.try_flush(&invoice, &salt, &destination),
        )
        .await?;

        // The sweep already succeeded on-chain; recording last-checkout-at
        // is idempotence bookkeeping, so a failure here is logged instead of
        // propagated.
        match self.store.set_last_checkout_at(&invoice.id, now).await {
            Ok(UpdateOutcome::Updated) => {}
            Ok(outcome) => {
                warn!(invoice = %invoice.id, ?outcome, "failed to record last_checkout_at");
            }
            Err(err) => {
                warn!(invoice = %invoice.id, error = %err, "failed to record last_checkout_at");
            }
        }

        Ok(())
    }

    /// After a transition into a terminal-for-sweep status, marks the
    /// invoice for checkout if it was created with the auto-checkout flag.
    /// Conditional and best-effort: a no-op outcome means the preconditions
    /// do not hold (not requested yet, not auto, already marked) and is not
    /// an error.
    async fn try_auto_checkout(&self, invoice_id: &str) -> Result<()> {
        self.store
            .try_set_auto_checkout(invoice_id, Utc::now())
            .await
            .map_err(store_error)?;
        Ok(())
    }

    fn asset(&self, name: &str) -> Result<&Arc<dyn Asset>> {
        self.assets.get(name).ok_or_else(|| Error::UnsupportedAsset {
            name: name.to_owned(),
        })
    }

    async fn load_invoice(
        &self,
        id: Option<&str>,
        wallet_address: Option<&str>,
        with_salt: bool,
    ) -> Result<Invoice> {
        self.store
            .invoice_by_ref(id, wallet_address, with_salt)
            .await
            .map_err(store_error)?
            .ok_or(Error::InvoiceNotFound)
    }

    /// Bounds a single outbound chain call; cancellation from the caller's
    /// scope propagates through the future as usual.
    async fn bounded<T>(
        &self,
        asset: &str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.chain_call_timeout, call).await {
            Ok(result) => result.map_err(|source_error| Error::AssetError {
                asset: asset.to_owned(),
                source_error,
            }),
            Err(_) => Err(Error::ChainCallTimeout {
                timeout_ms: self.chain_call_timeout.as_millis() as u64,
            }),
        }
    }
}

fn store_error<E>(err: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::StoreError {
        source_error: anyhow::Error::new(err),
    }
}

fn not_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

/// Folds the recovery checks with non-short-circuiting boolean arithmetic so
/// the amount of work does not depend on which check fails first.
fn any_check_failed<const N: usize>(checks: [bool; N]) -> bool {
    checks.into_iter().fold(false, |acc, failed| acc | failed)
}

fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

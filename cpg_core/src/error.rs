// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::invoice::{InvoiceStatus, MAX_METADATA_LEN};

/// Stable error category exposed across the transport boundary.
///
/// Callers branch on the category to decide recoverability; the variant
/// itself (and any wrapped cause) stays server-side for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorCategory {
    /// Caller-supplied data violates an invariant. Never retried.
    InvalidArgument,
    /// Unknown invoice id or unregistered/disabled asset.
    NotFound,
    /// The operation is illegal for the invoice's current status.
    StatusConflict,
    /// A conditional update affected zero rows because a concurrent writer
    /// already changed the row. Safe to retry after re-reading status.
    PreconditionFailed,
    /// Store or chain failure. Retry policy is left to the caller.
    Upstream,
}

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("recipient and beneficiary are the same address")]
    SameRecipientAndBeneficiary,
    #[error("min amount must be positive")]
    NonPositiveMinAmount,
    #[error("metadata length {length} exceeds the {MAX_METADATA_LEN} byte bound")]
    MetadataTooLarge { length: usize },
    #[error("deadline is not in the future")]
    PastDeadline,
    #[error("invoice id is empty")]
    EmptyInvoiceId,
    #[error("wallet address is empty")]
    EmptyWalletAddress,
    #[error("amount is not a base-10 decimal string: {input}")]
    InvalidAmount { input: String },
    #[error("asset is not supported: {name}")]
    UnsupportedAsset { name: String },
    #[error("invoice not found")]
    InvoiceNotFound,
    #[error("operation is not allowed for invoice status {status}")]
    StatusConflict { status: InvoiceStatus },
    #[error("invoice has invalid status")]
    InvalidInvoiceStatus,
    #[error("conditional update affected no rows")]
    PreconditionFailed,
    #[error("already requested to checkout")]
    CheckoutAlreadyRequested,
    #[error("invoice not requested to checkout")]
    CheckoutNotRequested,
    #[error("checkout request has not settled yet")]
    CheckoutNotSettled,
    #[error("failed to recover backup")]
    BackupRecovery,
    #[error("asset produced an empty wallet address")]
    WalletNotDerived,
    #[error("duplicate asset name: {name}")]
    DuplicateAsset { name: String },
    #[error("empty asset name")]
    EmptyAssetName,
    #[error("invalid assets config: {message}")]
    AssetConfig { message: String },
    #[error("keyring has no keys")]
    EmptyKeyring,
    #[error("failed to read keyring file")]
    KeyringIo(#[from] std::io::Error),
    #[error("chain call exceeded the {timeout_ms} ms bound")]
    ChainCallTimeout { timeout_ms: u64 },
    #[error("error from invoice store: {source_error}")]
    StoreError { source_error: anyhow::Error },
    #[error("error from asset {asset}: {source_error}")]
    AssetError {
        asset: String,
        source_error: anyhow::Error,
    },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::SameRecipientAndBeneficiary
            | Error::NonPositiveMinAmount
            | Error::MetadataTooLarge { .. }
            | Error::PastDeadline
            | Error::EmptyInvoiceId
            | Error::EmptyWalletAddress
            | Error::InvalidAmount { .. }
            | Error::BackupRecovery
            | Error::EmptyAssetName
            | Error::AssetConfig { .. }
            | Error::DuplicateAsset { .. }
            | Error::EmptyKeyring => ErrorCategory::InvalidArgument,
            Error::UnsupportedAsset { .. } | Error::InvoiceNotFound => ErrorCategory::NotFound,
            Error::StatusConflict { .. }
            | Error::InvalidInvoiceStatus
            | Error::CheckoutAlreadyRequested
            | Error::CheckoutNotRequested
            | Error::CheckoutNotSettled => ErrorCategory::StatusConflict,
            Error::PreconditionFailed => ErrorCategory::PreconditionFailed,
            Error::WalletNotDerived
            | Error::KeyringIo(_)
            | Error::ChainCallTimeout { .. }
            | Error::StoreError { .. }
            | Error::AssetError { .. } => ErrorCategory::Upstream,
        }
    }
}

pub type Result<T> = StdResult<T, Error>;

// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared harness for the gateway scenario tests: a gateway wired to the
//! in-memory store and the mock chain, with helpers for steering invoice
//! rows into states the guarded paths would take real time to reach.

use std::{sync::Arc, time::Duration};

use alloy_primitives::U256;
use chrono::{Duration as ChronoDuration, Utc};
use cpg_core::{
    keyring::KeyRing,
    manager::{
        context::memory::{InMemoryContext, MockAsset},
        CreateInvoiceParams, CreateInvoiceResult, Gateway,
    },
    registry::AssetRegistry,
};

pub const RECIPIENT: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const BENEFICIARY: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub const SALT_SECRET: &str = "salt ring secret";
pub const BACKUP_SECRET: &str = "backup ring secret";

pub struct Harness {
    pub gateway: Gateway<InMemoryContext>,
    pub context: InMemoryContext,
    pub asset: MockAsset,
}

/// Routes `tracing` output (keyring overlap warnings, best-effort
/// bookkeeping failures) into the test capture. Safe to call from every
/// test; only the first initialization takes effect.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn harness() -> Harness {
    init_tracing();
    let context = InMemoryContext::new();
    let asset = MockAsset::new(Duration::from_secs(1), U256::from(1_000u64));

    let mut assets = AssetRegistry::new();
    assets.register("mock", Arc::new(asset.clone())).unwrap();

    let gateway = Gateway::new(
        assets,
        context.clone(),
        KeyRing::new([SALT_SECRET]).unwrap(),
        KeyRing::new([BACKUP_SECRET]).unwrap(),
    );

    Harness {
        gateway,
        context,
        asset,
    }
}

pub fn create_params(min_amount: u64, auto_checkout: bool) -> CreateInvoiceParams {
    CreateInvoiceParams {
        asset_name: "mock".to_owned(),
        metadata: "order 42".to_owned(),
        recipient: RECIPIENT.to_owned(),
        beneficiary: BENEFICIARY.to_owned(),
        auto_checkout,
        min_amount: U256::from(min_amount),
        deadline: Utc::now() + ChronoDuration::hours(1),
    }
}

impl Harness {
    pub async fn create_pending(&self, min_amount: u64, auto_checkout: bool) -> CreateInvoiceResult {
        self.gateway
            .create_invoice(create_params(min_amount, auto_checkout))
            .await
            .unwrap()
    }

    pub fn wallet_of(&self, invoice_id: &str) -> String {
        self.context.row(invoice_id).unwrap().wallet_address
    }

    /// Rewrites the row's deadline into the past, turning a `Pending`
    /// invoice `Expired` without waiting for wall-clock time.
    pub fn force_deadline_past(&self, invoice_id: &str) {
        let mut row = self.context.row(invoice_id).unwrap();
        row.deadline = Utc::now() - ChronoDuration::hours(1);
        self.context.insert_raw(row);
    }

    /// Backdates the checkout request so the settle delay has elapsed.
    pub fn settle_checkout_request(&self, invoice_id: &str) {
        let mut row = self.context.row(invoice_id).unwrap();
        assert!(row.checkout_request_at.is_some(), "checkout not requested");
        row.checkout_request_at = Some(Utc::now() - ChronoDuration::minutes(1));
        self.context.insert_raw(row);
    }
}

// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Asset factory and asset registries, plus assets-config parsing.
//!
//! Both registries are explicit objects constructed once at process start
//! and passed by reference into the gateway and the config parser; there is
//! no ambient global state. Registration is append-only and duplicate names
//! are rejected, so once a registry is handed to the gateway it is read-only
//! and needs no synchronization.

use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;

use crate::{
    manager::adapters::{Asset, AssetFactory, AssetInfo},
    Error, Result,
};

/// Name → factory map populated at startup, before any invoice operation.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn AssetFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under its own name. Registering a duplicate or
    /// empty name is a fatal configuration error.
    pub fn register(&mut self, factory: Arc<dyn AssetFactory>) -> Result<()> {
        let name = factory.name().to_owned();
        if name.is_empty() {
            return Err(Error::EmptyAssetName);
        }
        if self.factories.contains_key(&name) {
            return Err(Error::DuplicateAsset { name });
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AssetFactory>> {
        self.factories.get(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Name → constructed asset map. Read-only once populated.
#[derive(Default)]
pub struct AssetRegistry {
    assets: HashMap<String, Arc<dyn Asset>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, asset: Arc<dyn Asset>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::EmptyAssetName);
        }
        if self.assets.contains_key(name) {
            return Err(Error::DuplicateAsset {
                name: name.to_owned(),
            });
        }
        self.assets.insert(name.to_owned(), asset);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Asset>> {
        self.assets.get(name)
    }

    /// Descriptors of every registered asset, for the `ListAssets` surface.
    pub fn infos(&self) -> impl Iterator<Item = (&str, AssetInfo)> {
        self.assets
            .iter()
            .map(|(name, asset)| (name.as_str(), asset.info()))
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// The `{type, enable}` envelope every config entry carries; the remaining
/// fields are factory-specific and decoded by the factory itself.
#[derive(Deserialize)]
struct EntryEnvelope {
    #[serde(rename = "type")]
    factory: String,
    #[serde(default)]
    enable: bool,
}

/// Parses the assets config: a JSON mapping of asset name to
/// `{type, enable, ...chain-specific fields}`.
///
/// Disabled entries are skipped. An unknown `type`, malformed entry, or a
/// factory build failure aborts the whole parse: the gateway starts with
/// the full configured asset set or not at all.
pub async fn parse_assets_config(
    factories: &FactoryRegistry,
    data: &[u8],
) -> Result<AssetRegistry> {
    let config: HashMap<String, serde_json::Value> =
        serde_json::from_slice(data).map_err(|err| Error::AssetConfig {
            message: err.to_string(),
        })?;

    let mut assets = AssetRegistry::new();
    for (asset_name, raw) in config {
        let envelope: EntryEnvelope =
            serde_json::from_value(raw.clone()).map_err(|err| Error::AssetConfig {
                message: format!("asset {asset_name}: {err}"),
            })?;
        if !envelope.enable {
            continue;
        }
        let factory = factories
            .get(&envelope.factory)
            .ok_or_else(|| Error::AssetConfig {
                message: format!(
                    "asset {asset_name}: no factory registered for type {}",
                    envelope.factory
                ),
            })?;
        let asset = factory
            .build(raw)
            .await
            .map_err(|source_error| Error::AssetError {
                asset: asset_name.clone(),
                source_error,
            })?;
        assets.register(&asset_name, asset)?;
    }
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy_primitives::U256;
    use async_trait::async_trait;

    use super::*;
    use crate::invoice::Invoice;

    struct StubAsset {
        min_delay: Duration,
    }

    #[async_trait]
    impl Asset for StubAsset {
        fn info(&self) -> AssetInfo {
            AssetInfo {
                min_delay: self.min_delay,
                salt_length: 32,
            }
        }

        async fn prepare_invoice(&self, _: &mut Invoice, _: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get_balance(&self, _: &Invoice) -> anyhow::Result<U256> {
            Ok(U256::ZERO)
        }

        async fn try_flush(&self, _: &Invoice, _: &[u8], _: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct StubFactory;

    #[derive(Deserialize)]
    struct StubConfig {
        min_delay_seconds: u64,
    }

    #[async_trait]
    impl AssetFactory for StubFactory {
        fn name(&self) -> &str {
            "stub"
        }

        async fn build(&self, config: serde_json::Value) -> anyhow::Result<Arc<dyn Asset>> {
            let config: StubConfig = serde_json::from_value(config)?;
            Ok(Arc::new(StubAsset {
                min_delay: Duration::from_secs(config.min_delay_seconds),
            }))
        }
    }

    fn factories() -> FactoryRegistry {
        let mut registry = FactoryRegistry::new();
        registry.register(Arc::new(StubFactory)).unwrap();
        registry
    }

    #[test]
    fn duplicate_factory_name_is_rejected() {
        let mut registry = factories();
        let err = registry.register(Arc::new(StubFactory)).unwrap_err();
        assert!(matches!(&err, Error::DuplicateAsset { name } if name == "stub"));
        // A duplicate registration is a startup configuration fault, not a
        // lifecycle conflict.
        assert_eq!(err.category(), crate::ErrorCategory::InvalidArgument);
    }

    #[tokio::test]
    async fn parses_enabled_entries_and_skips_disabled() {
        let config = br#"{
            "testnet": {"type": "stub", "enable": true, "min_delay_seconds": 3},
            "mainnet": {"type": "stub", "enable": false, "min_delay_seconds": 9}
        }"#;
        let assets = parse_assets_config(&factories(), config).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(
            assets.get("testnet").unwrap().info().min_delay,
            Duration::from_secs(3)
        );
        assert!(assets.get("mainnet").is_none());
    }

    #[tokio::test]
    async fn unknown_factory_type_aborts_the_parse() {
        let config = br#"{"testnet": {"type": "nope", "enable": true}}"#;
        assert!(matches!(
            parse_assets_config(&factories(), config).await,
            Err(Error::AssetConfig { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_factory_config_aborts_the_parse() {
        // Enabled entry missing the factory-specific field.
        let config = br#"{"testnet": {"type": "stub", "enable": true}}"#;
        assert!(matches!(
            parse_assets_config(&factories(), config).await,
            Err(Error::AssetError { asset, .. }) if asset == "testnet"
        ));
    }

    #[tokio::test]
    async fn missing_enable_defaults_to_disabled() {
        let config = br#"{"testnet": {"type": "stub", "min_delay_seconds": 3}}"#;
        let assets = parse_assets_config(&factories(), config).await.unwrap();
        assert!(assets.is_empty());
    }
}

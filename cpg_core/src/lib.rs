// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
//! ## Getting started
//!
//! Take a look at the [`manager`] module: [`manager::Gateway`] is the entry
//! point for every invoice operation, and [`manager::adapters`] lists the
//! traits to implement for a concrete chain, datastore and rate-limit
//! backend. An in-memory context for development and tests lives in
//! [`manager::context::memory`] behind the default `in_memory` feature.

use alloy_primitives::U256;

mod error;
pub mod invoice;
pub mod keyring;
pub mod manager;
pub mod registry;

pub use error::{Error, ErrorCategory, Result};

/// Parses an amount from the base-10 decimal string form it travels in
/// across the transport boundary. Rejects empty input, signs, radix
/// prefixes and anything else that is not a plain decimal integer;
/// arbitrary precision is preserved up to the 256-bit amount width.
pub fn parse_amount(input: &str) -> Result<U256> {
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidAmount {
            input: input.to_owned(),
        });
    }
    U256::from_str_radix(input, 10).map_err(|_| Error::InvalidAmount {
        input: input.to_owned(),
    })
}

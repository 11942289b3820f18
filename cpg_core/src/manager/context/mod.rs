// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reference context implementations for the gateway.

pub mod memory;

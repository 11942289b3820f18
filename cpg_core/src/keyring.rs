// Copyright 2023-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Symmetric authenticated encryption with key-rotation support.
//!
//! A [`KeyRing`] is an ordered set of 256-bit keys derived by hashing
//! arbitrary-length secrets. Encryption always uses the newest key (the ring
//! head); decryption tries every retained key in order, so a key can be
//! rotated in without invalidating previously encrypted data.
//!
//! The wire layout is `nonce || ciphertext || tag` with a 24-byte
//! XChaCha20 nonce, so a ciphertext is self-contained.

use std::{fs, path::Path};

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Byte length of the nonce prepended to every ciphertext.
pub const NONCE_LEN: usize = 24;

pub struct KeyRing {
    keys: Vec<[u8; 32]>,
}

impl KeyRing {
    /// Builds a ring from raw secrets, newest first. Each secret is hashed
    /// with SHA-256 into a fixed-size key.
    pub fn new<I, S>(secrets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let keys: Vec<[u8; 32]> = secrets
            .into_iter()
            .map(|secret| Sha256::digest(secret.as_ref()).into())
            .collect();
        if keys.is_empty() {
            return Err(Error::EmptyKeyring);
        }
        Ok(Self { keys })
    }

    /// Loads a ring from a line-oriented secret file: one raw secret per
    /// line, blank lines ignored.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::new(
            data.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned),
        )
    }

    /// Encrypts `plaintext` under the ring head with the given nonce.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &[u8; NONCE_LEN]) -> Vec<u8> {
        let cipher = XChaCha20Poly1305::new((&self.keys[0]).into());
        let boxed = cipher
            .encrypt(XNonce::from_slice(nonce), plaintext)
            .expect("XChaCha20Poly1305 encryption is infallible for in-memory buffers");
        let mut out = Vec::with_capacity(NONCE_LEN + boxed.len());
        out.extend_from_slice(nonce);
        out.extend_from_slice(&boxed);
        out
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.encrypt(plaintext, &nonce)
    }

    /// Tries every key in ring order and returns the first successful
    /// authenticated decryption. `None` means no retained key authenticates
    /// the payload; callers must treat that as a checked condition.
    pub fn decrypt(&self, encrypted: &[u8]) -> Option<Vec<u8>> {
        if encrypted.len() < NONCE_LEN {
            return None;
        }
        let (nonce, boxed) = encrypted.split_at(NONCE_LEN);
        self.keys.iter().find_map(|key| {
            XChaCha20Poly1305::new(key.into())
                .decrypt(XNonce::from_slice(nonce), boxed)
                .ok()
        })
    }

    /// Reports whether any key is shared between the two rings. Used as an
    /// operational safety warning only, never to alter behavior.
    pub fn shares_key_with(&self, other: &KeyRing) -> bool {
        self.keys.iter().any(|key| other.keys.contains(key))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

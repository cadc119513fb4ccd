// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NWK security hook
//!
//! The engine decides when a frame is secured; the cipher (AES-CCM*, frame
//! counters, auxiliary header) belongs to the [`SecurityProvider`]. Network
//! keys live in the NIB as [`SecurityMaterial`] and are zeroized when they
//! are replaced, on reset and on leave.

use core::fmt;
use q_common::constants::SECURITY_MATERIAL_SLOTS;
use q_common::{Error, ExtAddr, NetworkKey, Result};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::frame::{FrameBuf, NwkHeader};

// ============================================================================
// Key Material
// ============================================================================

/// One network key and its sequence number
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecurityMaterial {
    /// Key sequence number
    pub key_seq: u8,
    /// Network key
    pub key: NetworkKey,
}

impl SecurityMaterial {
    /// Create key material
    #[must_use]
    pub const fn new(key_seq: u8, key: NetworkKey) -> Self {
        Self { key_seq, key }
    }
}

impl fmt::Debug for SecurityMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityMaterial")
            .field("key_seq", &self.key_seq)
            .finish_non_exhaustive()
    }
}

/// Network key slots held in the NIB
#[derive(Debug, Clone)]
pub struct SecurityMaterialSet {
    slots: [Option<SecurityMaterial>; SECURITY_MATERIAL_SLOTS],
    active_seq: Option<u8>,
}

impl SecurityMaterialSet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            active_seq: None,
        }
    }

    /// Store a key, replacing one with the same sequence number or else a
    /// slot that is not active
    ///
    /// # Errors
    /// `InternalError` if no slot can be replaced.
    pub fn install(&mut self, material: SecurityMaterial) -> Result<()> {
        let seq = material.key_seq;
        let active = self.active_seq;
        let idx = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|m| m.key_seq == seq))
            .or_else(|| self.slots.iter().position(Option::is_none))
            .or_else(|| {
                self.slots
                    .iter()
                    .position(|s| s.as_ref().is_some_and(|m| Some(m.key_seq) != active))
            })
            .ok_or(Error::InternalError)?;
        // Dropping the old value zeroizes it
        self.slots[idx] = Some(material);
        Ok(())
    }

    /// Make the key with `seq` the one used for outgoing frames
    ///
    /// # Errors
    /// `NoKey` if no key with that sequence number is installed.
    pub fn activate(&mut self, seq: u8) -> Result<()> {
        if self.find(seq).is_none() {
            return Err(Error::NoKey);
        }
        self.active_seq = Some(seq);
        Ok(())
    }

    /// Key used for outgoing frames
    #[must_use]
    pub fn active(&self) -> Option<&SecurityMaterial> {
        self.active_seq.and_then(|seq| self.find(seq))
    }

    /// Sequence number of the active key
    #[must_use]
    pub const fn active_seq(&self) -> Option<u8> {
        self.active_seq
    }

    /// Look up a key by sequence number
    #[must_use]
    pub fn find(&self, seq: u8) -> Option<&SecurityMaterial> {
        self.slots
            .iter()
            .flatten()
            .find(|m| m.key_seq == seq)
    }

    /// Number of installed keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Check for an empty set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wipe every key
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if let Some(material) = slot.as_mut() {
                material.zeroize();
            }
            *slot = None;
        }
        self.active_seq = None;
    }
}

impl Default for SecurityMaterialSet {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Security service provider
///
/// `frame` always holds a complete NWK frame; the first `header_len` bytes
/// are the NWK header, which must stay readable and is authenticated.
pub trait SecurityProvider {
    /// Decide whether an outgoing frame must be secured
    fn is_encryption_required(&self, header: &NwkHeader) -> bool;

    /// Secure an outgoing frame in place
    ///
    /// # Errors
    /// `MaxFrameCounter` when the outgoing counter is exhausted,
    /// `SecurityFailure` on any other failure.
    fn encrypt_output_packet(
        &mut self,
        material: &SecurityMaterial,
        src_ext: ExtAddr,
        header_len: usize,
        frame: &mut FrameBuf,
    ) -> Result<()>;

    /// Decide whether an incoming frame must be unsecured before use
    fn is_decryption_required(&self, header: &NwkHeader) -> bool;

    /// Unsecure an incoming frame in place, leaving header plus plaintext
    ///
    /// # Errors
    /// `NoKey` if the key sequence is unknown, `SecurityFailure` on MIC or
    /// frame counter failure.
    fn decrypt_input_packet(
        &mut self,
        keys: &SecurityMaterialSet,
        header_len: usize,
        frame: &mut FrameBuf,
    ) -> Result<()>;
}

/// Provider for unsecured networks
///
/// Never secures outgoing frames and rejects secured incoming frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSecurity;

impl SecurityProvider for NoSecurity {
    fn is_encryption_required(&self, _header: &NwkHeader) -> bool {
        false
    }

    fn encrypt_output_packet(
        &mut self,
        _material: &SecurityMaterial,
        _src_ext: ExtAddr,
        _header_len: usize,
        _frame: &mut FrameBuf,
    ) -> Result<()> {
        Ok(())
    }

    fn is_decryption_required(&self, header: &NwkHeader) -> bool {
        header.security
    }

    fn decrypt_input_packet(
        &mut self,
        _keys: &SecurityMaterialSet,
        _header_len: usize,
        _frame: &mut FrameBuf,
    ) -> Result<()> {
        Err(Error::NoKey)
    }
}

//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
// Sponsored by NLnet as part of the Next Generation Internet initiative.
// See: https://nlnet.nl/NGI0
//

use bytes::TryGetError;
use tracing::warn;

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;
pub type TlvDecodeResult<T> = Result<T, TlvDecodeError>;

// IS-IS message decoding errors.
#[derive(Debug, Eq, PartialEq)]
pub enum DecodeError {
    ReadOutOfBounds,
    IncompletePdu,
    InvalidHeaderLength(u8),
    InvalidIrdpDiscriminator(u8),
    InvalidVersion(u8),
    InvalidIdLength(u8),
    UnknownPduType(u8),
    InvalidPduLength(u16),
    InvalidTlvLength(u8),
}

// IS-IS TLV decoding errors.
#[derive(Debug, Eq, PartialEq)]
pub enum TlvDecodeError {
    ReadOutOfBounds,
    InvalidLength(u8),
}

// ===== impl DecodeError =====

impl DecodeError {
    pub(crate) fn log(&self) {
        match self {
            DecodeError::InvalidHeaderLength(hdr_len) => {
                warn!(%hdr_len, "{}", self);
            }
            DecodeError::InvalidIrdpDiscriminator(discriminator) => {
                warn!(%discriminator, "{}", self);
            }
            DecodeError::InvalidVersion(version) => {
                warn!(%version, "{}", self);
            }
            DecodeError::InvalidIdLength(id_len) => {
                warn!(%id_len, "{}", self);
            }
            DecodeError::UnknownPduType(pdu_type) => {
                warn!(%pdu_type, "{}", self);
            }
            DecodeError::InvalidPduLength(pdu_len) => {
                warn!(%pdu_len, "{}", self);
            }
            DecodeError::InvalidTlvLength(tlv_len) => {
                warn!(%tlv_len, "{}", self);
            }
            _ => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
            DecodeError::IncompletePdu => {
                write!(f, "incomplete PDU")
            }
            DecodeError::InvalidHeaderLength(..) => {
                write!(f, "invalid header length")
            }
            DecodeError::InvalidIrdpDiscriminator(..) => {
                write!(f, "invalid IDRP discriminator")
            }
            DecodeError::InvalidVersion(..) => {
                write!(f, "invalid version")
            }
            DecodeError::InvalidIdLength(..) => {
                write!(f, "invalid ID length")
            }
            DecodeError::UnknownPduType(..) => {
                write!(f, "unknown PDU type")
            }
            DecodeError::InvalidPduLength(..) => {
                write!(f, "invalid PDU length")
            }
            DecodeError::InvalidTlvLength(..) => {
                write!(f, "invalid TLV length")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::ReadOutOfBounds
    }
}

// ===== impl TlvDecodeError =====

impl TlvDecodeError {
    pub(crate) fn log(&self) {
        match self {
            TlvDecodeError::InvalidLength(tlv_len) => {
                warn!(%tlv_len, "{}", self);
            }
            _ => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for TlvDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlvDecodeError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
            TlvDecodeError::InvalidLength(..) => {
                write!(f, "invalid TLV length")
            }
        }
    }
}

impl std::error::Error for TlvDecodeError {}

impl From<TryGetError> for TlvDecodeError {
    fn from(_error: TryGetError) -> TlvDecodeError {
        TlvDecodeError::ReadOutOfBounds
    }
}

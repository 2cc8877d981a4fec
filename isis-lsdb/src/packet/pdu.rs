//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
// Sponsored by NLnet as part of the Next Generation Internet initiative.
// See: https://nlnet.nl/NGI0
//

use std::cell::{RefCell, RefMut};

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::consts::{
    IDRP_DISCRIMINATOR, PduType, SYSTEM_ID_LEN, TlvType, VERSION,
    VERSION_PROTO_EXT,
};
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::tlv::{
    DynamicHostnameTlv, LspEntriesTlv, LspEntry, ProtocolsSupportedTlv,
    TLV_HDR_SIZE, UnknownTlv,
};
use crate::packet::{LanId, LevelNumber, LspId};

thread_local!(
    static TLS_BUF: RefCell<BytesMut> =
        RefCell::new(BytesMut::with_capacity(4096))
);

// IS-IS PDU.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Pdu {
    Lsp(Lsp),
    Snp(Snp),
}

// IS-IS PDU common header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Header {
    pub pdu_type: PduType,
    pub max_area_addrs: u8,
}

// IS-IS Link State PDU.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Lsp {
    pub hdr: Header,
    pub rem_lifetime: u16,
    pub lsp_id: LspId,
    pub seqno: u32,
    pub cksum: u16,
    pub flags: LspFlags,
    pub tlvs: LspTlvs,
    pub raw: Bytes,
}

// IS-IS LSP flags field.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LspFlags: u8 {
        const P = 0x80;
        const ATT = 0x40;
        const OL = 0x04;
        const IS_TYPE2 = 0x02;
        const IS_TYPE1 = 0x01;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LspTlvs {
    pub protocols_supported: Option<ProtocolsSupportedTlv>,
    pub hostname: Option<DynamicHostnameTlv>,
    pub unknown: Vec<UnknownTlv>,
}

// IS-IS Sequence Numbers PDU.
//
// CSNPs and PSNPs share the same layout, except that only the former carries
// the start/end LSP ID summary range.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Snp {
    pub hdr: Header,
    pub source: LanId,
    pub summary: Option<(LspId, LspId)>,
    pub tlvs: SnpTlvs,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct SnpTlvs {
    pub lsp_entries: Vec<LspEntriesTlv>,
    pub unknown: Vec<UnknownTlv>,
}

// ===== impl Pdu =====

impl Pdu {
    // Decodes IS-IS PDU from a bytes buffer.
    pub fn decode(mut buf: Bytes) -> DecodeResult<Self> {
        let buf_orig = BytesMut::from(buf.clone());

        // Decode PDU common header.
        let hdr = Header::decode(&mut buf)?;

        // Decode PDU-specific fields.
        let pdu = match hdr.pdu_type {
            PduType::LspL1 | PduType::LspL2 => {
                Pdu::Lsp(Lsp::decode(hdr, &mut buf, buf_orig)?)
            }
            PduType::CsnpL1
            | PduType::CsnpL2
            | PduType::PsnpL1
            | PduType::PsnpL2 => Pdu::Snp(Snp::decode(hdr, &mut buf, buf_orig)?),
        };

        Ok(pdu)
    }

    // Encodes IS-IS PDU into a bytes buffer.
    pub fn encode(&self) -> Bytes {
        match self {
            Pdu::Lsp(pdu) => pdu.raw.clone(),
            Pdu::Snp(pdu) => pdu.encode(),
        }
    }

    // Returns the IS-IS PDU type.
    pub const fn pdu_type(&self) -> PduType {
        match self {
            Pdu::Lsp(pdu) => pdu.hdr.pdu_type,
            Pdu::Snp(pdu) => pdu.hdr.pdu_type,
        }
    }
}

// ===== impl Header =====

impl Header {
    const LEN: u8 = 8;

    pub const fn new(pdu_type: PduType) -> Self {
        Header {
            pdu_type,
            max_area_addrs: 0,
        }
    }

    // Decodes IS-IS PDU header from a bytes buffer.
    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let packet_len = buf.len();

        // Ensure the packet has enough data for the fixed-length IS-IS header.
        if packet_len < Self::LEN as _ {
            return Err(DecodeError::IncompletePdu);
        }

        // Parse IDRP discriminator.
        let idrp_discr = buf.try_get_u8()?;
        if idrp_discr != IDRP_DISCRIMINATOR {
            return Err(DecodeError::InvalidIrdpDiscriminator(idrp_discr));
        }

        // Parse length of fixed header.
        let fixed_header_length = buf.try_get_u8()?;

        // Parse version/protocol ID extension.
        let version_proto_ext = buf.try_get_u8()?;
        if version_proto_ext != VERSION_PROTO_EXT {
            return Err(DecodeError::InvalidVersion(version_proto_ext));
        }

        // Parse ID length.
        let id_len = buf.try_get_u8()?;
        if id_len != 0 && id_len != SYSTEM_ID_LEN {
            return Err(DecodeError::InvalidIdLength(id_len));
        }

        // Parse PDU type.
        let pdu_type = buf.try_get_u8()?;
        let pdu_type = match PduType::from_u8(pdu_type) {
            Some(pdu_type) => pdu_type,
            None => return Err(DecodeError::UnknownPduType(pdu_type)),
        };

        // Additional sanity checks.
        if fixed_header_length != Self::fixed_header_length(pdu_type) {
            return Err(DecodeError::InvalidHeaderLength(fixed_header_length));
        }
        if packet_len < fixed_header_length as _ {
            return Err(DecodeError::IncompletePdu);
        }

        // Parse version.
        let version = buf.try_get_u8()?;
        if version != VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }

        // Parse reserved field.
        let _reserved = buf.try_get_u8()?;

        // Parse maximum area addresses.
        let max_area_addrs = buf.try_get_u8()?;

        Ok(Header {
            pdu_type,
            max_area_addrs,
        })
    }

    // Encodes IS-IS PDU header into a bytes buffer.
    fn encode(&self, buf: &mut BytesMut) {
        // Encode IDRP discriminator.
        buf.put_u8(IDRP_DISCRIMINATOR);
        // Encode length of fixed header.
        buf.put_u8(Self::fixed_header_length(self.pdu_type));
        // Encode version/protocol ID extension.
        buf.put_u8(VERSION_PROTO_EXT);
        // Encode ID length (use default value).
        buf.put_u8(0);
        // Encode PDU type.
        buf.put_u8(self.pdu_type as u8);
        // Encode version.
        buf.put_u8(VERSION);
        // Encode reserved field.
        buf.put_u8(0);
        // Encode maximum area addresses.
        buf.put_u8(self.max_area_addrs);
    }

    // Returns the length of the fixed header for a given PDU type.
    const fn fixed_header_length(pdu_type: PduType) -> u8 {
        match pdu_type {
            PduType::LspL1 | PduType::LspL2 => Lsp::HEADER_LEN,
            PduType::CsnpL1 | PduType::CsnpL2 => Snp::CSNP_HEADER_LEN,
            PduType::PsnpL1 | PduType::PsnpL2 => Snp::PSNP_HEADER_LEN,
        }
    }
}

// ===== impl Lsp =====

impl Lsp {
    pub const HEADER_LEN: u8 = 27;
    const REM_LIFETIME_RANGE: std::ops::Range<usize> = 10..12;
    const CKSUM_RANGE: std::ops::Range<usize> = 24..26;

    pub fn new(
        level: LevelNumber,
        rem_lifetime: u16,
        lsp_id: LspId,
        seqno: u32,
        flags: LspFlags,
        tlvs: LspTlvs,
    ) -> Self {
        let pdu_type = match level {
            LevelNumber::L1 => PduType::LspL1,
            LevelNumber::L2 => PduType::LspL2,
        };
        let mut lsp = Lsp {
            hdr: Header::new(pdu_type),
            rem_lifetime,
            lsp_id,
            seqno,
            cksum: 0,
            flags,
            tlvs,
            raw: Default::default(),
        };
        lsp.encode();
        lsp
    }

    fn decode(
        hdr: Header,
        buf: &mut Bytes,
        buf_orig: BytesMut,
    ) -> DecodeResult<Self> {
        // Parse PDU length.
        let pdu_len = buf.try_get_u16()?;
        if pdu_len != buf_orig.len() as u16 {
            return Err(DecodeError::InvalidPduLength(pdu_len));
        }

        // Parse remaining lifetime.
        let rem_lifetime = buf.try_get_u16()?;

        // Parse LSP ID.
        let lsp_id = LspId::decode(buf)?;

        // Parse sequence number.
        let seqno = buf.try_get_u32()?;

        // Parse checksum.
        let cksum = buf.try_get_u16()?;

        // Parse flags.
        let flags = buf.try_get_u8()?;
        let flags = LspFlags::from_bits_truncate(flags);

        // Parse top-level TLVs.
        let mut tlvs = LspTlvs::default();
        while buf.remaining() >= TLV_HDR_SIZE {
            // Parse TLV type.
            let tlv_type = buf.try_get_u8()?;
            let tlv_etype = TlvType::from_u8(tlv_type);

            // Parse and validate TLV length.
            let tlv_len = buf.try_get_u8()?;
            if tlv_len as usize > buf.remaining() {
                return Err(DecodeError::InvalidTlvLength(tlv_len));
            }

            // Parse TLV value.
            let mut buf_tlv = buf.copy_to_bytes(tlv_len as usize);
            match tlv_etype {
                Some(TlvType::ProtocolsSupported) => {
                    if tlvs.protocols_supported.is_some() {
                        continue;
                    }
                    match ProtocolsSupportedTlv::decode(tlv_len, &mut buf_tlv) {
                        Ok(tlv) => tlvs.protocols_supported = Some(tlv),
                        Err(error) => error.log(),
                    }
                }
                Some(TlvType::DynamicHostname) => {
                    match DynamicHostnameTlv::decode(tlv_len, &mut buf_tlv) {
                        Ok(tlv) => tlvs.hostname = Some(tlv),
                        Err(error) => error.log(),
                    }
                }
                _ => {
                    // Save unknown top-level TLV.
                    tlvs.unknown
                        .push(UnknownTlv::new(tlv_type, tlv_len, buf_tlv));
                }
            }
        }

        Ok(Lsp {
            hdr,
            rem_lifetime,
            lsp_id,
            seqno,
            cksum,
            flags,
            tlvs,
            raw: buf_orig.freeze(),
        })
    }

    pub(crate) fn encode(&mut self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = pdu_encode_start(buf, &self.hdr);

            // The PDU length will be initialized later.
            let len_pos = buf.len();
            buf.put_u16(0);
            // The remaining lifetime will be initialized later.
            buf.put_u16(0);
            self.lsp_id.encode(&mut buf);
            buf.put_u32(self.seqno);
            // The checksum will be initialized later.
            buf.put_u16(0);
            buf.put_u8(self.flags.bits());

            // Encode TLVs.
            if let Some(tlv) = &self.tlvs.protocols_supported {
                tlv.encode(&mut buf);
            }
            if let Some(tlv) = &self.tlvs.hostname {
                tlv.encode(&mut buf);
            }

            // Store LSP raw data.
            let bytes = pdu_encode_end(buf, len_pos, Some(self));
            self.raw = bytes.clone();
            bytes
        })
    }

    // Updates the LSP remaining lifetime, patching the raw data in place.
    //
    // The checksum does not cover the Remaining Lifetime field, so it stays
    // valid.
    pub fn set_rem_lifetime(&mut self, rem_lifetime: u16) {
        self.rem_lifetime = rem_lifetime;

        if self.raw.len() >= Self::REM_LIFETIME_RANGE.end {
            let mut raw = BytesMut::from(std::mem::take(&mut self.raw));
            raw[Self::REM_LIFETIME_RANGE]
                .copy_from_slice(&rem_lifetime.to_be_bytes());
            self.raw = raw.freeze();
        }
    }

    // Computes the LSP checksum.
    fn checksum(data: &[u8]) -> [u8; 2] {
        let checksum = fletcher::calc_fletcher16(data);
        let mut checkbyte0 = (checksum & 0x00FF) as i32;
        let mut checkbyte1 = ((checksum >> 8) & 0x00FF) as i32;

        // Adjust checksum value using scaling factor.
        let sop = data.len() as u16 - 13;
        let mut x = (sop as i32 * checkbyte0 - checkbyte1) % 255;
        if x <= 0 {
            x += 255;
        }
        checkbyte1 = 510 - checkbyte0 - x;
        if checkbyte1 > 255 {
            checkbyte1 -= 255;
        }
        checkbyte0 = x;
        [checkbyte0 as u8, checkbyte1 as u8]
    }

    // Checks if the LSP checksum is valid.
    pub fn is_checksum_valid(&self) -> bool {
        // RFC 3719 - Section 7:
        // "An implementation SHOULD treat all LSPs with a zero checksum and a
        // non-zero remaining lifetime as if they had as checksum error".
        if self.cksum == 0 {
            return self.rem_lifetime == 0;
        }

        // Skip everything before (and including) the Remaining Lifetime field.
        fletcher::calc_fletcher16(&self.raw[12..]) == 0
    }

    // Projects the LSP to the 16-octet summary form carried by SNPs.
    pub fn as_snp_entry(&self) -> LspEntry {
        LspEntry {
            rem_lifetime: self.rem_lifetime,
            lsp_id: self.lsp_id,
            seqno: self.seqno,
            cksum: self.cksum,
        }
    }
}

// ===== impl LspTlvs =====

impl LspTlvs {
    pub fn new(
        protocols_supported: impl IntoIterator<Item = u8>,
        hostname: Option<String>,
    ) -> Self {
        LspTlvs {
            protocols_supported: Some(ProtocolsSupportedTlv::from(
                protocols_supported,
            )),
            hostname: hostname.map(|hostname| DynamicHostnameTlv { hostname }),
            unknown: Default::default(),
        }
    }
}

// ===== impl Snp =====

impl Snp {
    pub const CSNP_HEADER_LEN: u8 = 33;
    pub const PSNP_HEADER_LEN: u8 = 17;

    pub fn new(
        level: LevelNumber,
        source: LanId,
        summary: Option<(LspId, LspId)>,
        tlvs: SnpTlvs,
    ) -> Self {
        let pdu_type = match (summary.is_some(), level) {
            (false, LevelNumber::L1) => PduType::PsnpL1,
            (false, LevelNumber::L2) => PduType::PsnpL2,
            (true, LevelNumber::L1) => PduType::CsnpL1,
            (true, LevelNumber::L2) => PduType::CsnpL2,
        };
        Snp {
            hdr: Header::new(pdu_type),
            source,
            summary,
            tlvs,
        }
    }

    // Builds as many CSNPs as needed to describe the given LSP entries within
    // the provided MTU.
    //
    // Entries are packed in input order. The start and end LSP IDs of each
    // CSNP cover exactly the entries packed into it; an empty input produces
    // a single CSNP describing the full LSPID range.
    pub fn new_csnps(
        level: LevelNumber,
        source: LanId,
        entries: Vec<LspEntry>,
        mtu: u16,
    ) -> Vec<Snp> {
        if entries.is_empty() {
            let summary =
                Some((LspId::from([0x00; 8]), LspId::from([0xff; 8])));
            let csnp = Snp::new(level, source, summary, SnpTlvs::default());
            return vec![csnp];
        }

        let max_entries = SnpTlvs::max_lsp_entries(
            (mtu as usize).saturating_sub(Self::CSNP_HEADER_LEN as usize),
        );
        if max_entries == 0 {
            return vec![];
        }

        entries
            .chunks(max_entries)
            .map(|chunk| {
                let (start, end) = chunk.iter().fold(
                    (chunk[0].lsp_id, chunk[0].lsp_id),
                    |(start, end), entry| {
                        (start.min(entry.lsp_id), end.max(entry.lsp_id))
                    },
                );
                Snp::new(
                    level,
                    source,
                    Some((start, end)),
                    SnpTlvs::new(chunk.iter().copied()),
                )
            })
            .collect()
    }

    // Builds as many PSNPs as needed to carry the given LSP entries within
    // the provided MTU. An empty input produces no PSNPs.
    pub fn new_psnps(
        level: LevelNumber,
        source: LanId,
        entries: Vec<LspEntry>,
        mtu: u16,
    ) -> Vec<Snp> {
        let max_entries = SnpTlvs::max_lsp_entries(
            (mtu as usize).saturating_sub(Self::PSNP_HEADER_LEN as usize),
        );
        if max_entries == 0 {
            return vec![];
        }

        entries
            .chunks(max_entries)
            .map(|chunk| {
                Snp::new(level, source, None, SnpTlvs::new(chunk.iter().copied()))
            })
            .collect()
    }

    fn decode(
        hdr: Header,
        buf: &mut Bytes,
        buf_orig: BytesMut,
    ) -> DecodeResult<Self> {
        // Parse PDU length.
        let pdu_len = buf.try_get_u16()?;
        if pdu_len != buf_orig.len() as u16 {
            return Err(DecodeError::InvalidPduLength(pdu_len));
        }

        // Parse source ID.
        let source = LanId::decode(buf)?;

        // Parse start and end LSP IDs.
        let mut summary = None;
        if matches!(hdr.pdu_type, PduType::CsnpL1 | PduType::CsnpL2) {
            let start_lsp_id = LspId::decode(buf)?;
            let end_lsp_id = LspId::decode(buf)?;
            summary = Some((start_lsp_id, end_lsp_id));
        }

        // Parse top-level TLVs.
        let mut tlvs = SnpTlvs::default();
        while buf.remaining() >= TLV_HDR_SIZE {
            // Parse TLV type.
            let tlv_type = buf.try_get_u8()?;
            let tlv_etype = TlvType::from_u8(tlv_type);

            // Parse and validate TLV length.
            let tlv_len = buf.try_get_u8()?;
            if tlv_len as usize > buf.remaining() {
                return Err(DecodeError::InvalidTlvLength(tlv_len));
            }

            // Parse TLV value.
            let mut buf_tlv = buf.copy_to_bytes(tlv_len as usize);
            match tlv_etype {
                Some(TlvType::LspEntries) => {
                    match LspEntriesTlv::decode(tlv_len, &mut buf_tlv) {
                        Ok(tlv) => tlvs.lsp_entries.push(tlv),
                        Err(error) => error.log(),
                    }
                }
                _ => {
                    // Save unknown top-level TLV.
                    tlvs.unknown
                        .push(UnknownTlv::new(tlv_type, tlv_len, buf_tlv));
                }
            }
        }

        Ok(Snp {
            hdr,
            source,
            summary,
            tlvs,
        })
    }

    fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = pdu_encode_start(buf, &self.hdr);

            // The PDU length will be initialized later.
            let len_pos = buf.len();
            buf.put_u16(0);
            self.source.encode(&mut buf);

            if let Some((start_lsp_id, end_lsp_id)) = &self.summary {
                start_lsp_id.encode(&mut buf);
                end_lsp_id.encode(&mut buf);
            }

            // Encode TLVs.
            for tlv in &self.tlvs.lsp_entries {
                tlv.encode(&mut buf);
            }

            pdu_encode_end(buf, len_pos, None)
        })
    }
}

// ===== impl SnpTlvs =====

impl SnpTlvs {
    pub fn new(lsp_entries: impl IntoIterator<Item = LspEntry>) -> Self {
        // Fragment TLVs as necessary.
        let lsp_entries = lsp_entries
            .into_iter()
            .collect::<Vec<_>>()
            .chunks(LspEntriesTlv::MAX_ENTRIES)
            .map(|chunk| LspEntriesTlv {
                list: chunk.to_vec(),
            })
            .collect();

        SnpTlvs {
            lsp_entries,
            unknown: Default::default(),
        }
    }

    // Calculates the maximum number of LSP entries that can fit within the
    // given size.
    pub(crate) fn max_lsp_entries(mut size: usize) -> usize {
        let mut lsp_entries = 0;

        // Calculate how many full TLVs fit in the available size.
        let full_tlvs = size / LspEntriesTlv::MAX_SIZE;

        // Update the remaining size after accounting for all full TLVs.
        size %= LspEntriesTlv::MAX_SIZE;

        // Add the number of LSP entries from all full TLVs.
        lsp_entries +=
            full_tlvs * (LspEntriesTlv::MAX_SIZE / LspEntriesTlv::ENTRY_SIZE);

        // Check if the remaining size has enough room for a partial TLV.
        if size >= (TLV_HDR_SIZE + LspEntriesTlv::ENTRY_SIZE) {
            // Add the number of LSP entries from the remaining partial TLV.
            lsp_entries += (size - TLV_HDR_SIZE) / LspEntriesTlv::ENTRY_SIZE;
        }

        lsp_entries
    }

    // Returns an iterator over all LSP entries from TLVs of type 9.
    pub fn lsp_entries(&self) -> impl Iterator<Item = &LspEntry> {
        self.lsp_entries.iter().flat_map(|tlv| tlv.list.iter())
    }
}

// ===== helper functions =====

fn pdu_encode_start<'a>(
    buf: &'a RefCell<BytesMut>,
    hdr: &Header,
) -> RefMut<'a, BytesMut> {
    let mut buf = buf.borrow_mut();
    buf.clear();
    hdr.encode(&mut buf);
    buf
}

fn pdu_encode_end(
    mut buf: RefMut<'_, BytesMut>,
    len_pos: usize,
    lsp: Option<&mut Lsp>,
) -> Bytes {
    // Initialize PDU length.
    let pkt_len = buf.len() as u16;
    buf[len_pos..len_pos + 2].copy_from_slice(&pkt_len.to_be_bytes());

    if let Some(lsp) = lsp {
        // Initialize LSP remaining lifetime.
        buf[Lsp::REM_LIFETIME_RANGE]
            .copy_from_slice(&lsp.rem_lifetime.to_be_bytes());

        // Compute and initialize LSP checksum.
        let cksum = Lsp::checksum(&buf[12..]);
        buf[Lsp::CKSUM_RANGE].copy_from_slice(&cksum);
        lsp.cksum = u16::from_be_bytes(cksum);
    }

    buf.clone().freeze()
}

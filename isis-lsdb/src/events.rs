//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
// Sponsored by NLnet as part of the Next Generation Internet initiative.
// See: https://nlnet.nl/NGI0
//

use std::collections::BTreeSet;

use crate::debug::Debug;
use crate::error::Error;
use crate::interface::{InterfaceId, Interfaces};
use crate::lsdb::{LsdbEntry, LspMap, LspStore};
use crate::packet::LevelNumber;
use crate::packet::pdu::{Lsp, Pdu, Snp};
use crate::packet::tlv::LspEntry;

// ===== PDU receipt =====

pub(crate) fn process_pdu(
    level: LevelNumber,
    store: &LspStore,
    interfaces: &Interfaces,
    iface_id: InterfaceId,
    pdu: Pdu,
) -> Result<(), Error> {
    // Lookup interface.
    let iface = interfaces
        .get(iface_id)
        .ok_or(Error::InterfaceIdNotFound(iface_id))?;

    Debug::PduRx(level, &iface.name, &pdu).log();

    match pdu {
        Pdu::Lsp(lsp) => process_lsp(level, store, interfaces, iface_id, lsp),
        Pdu::Snp(snp) if snp.summary.is_some() => {
            process_csnp(level, store, iface_id, snp)
        }
        Pdu::Snp(snp) => process_psnp(store, iface_id, snp),
    }

    Ok(())
}

fn process_lsp(
    level: LevelNumber,
    store: &LspStore,
    interfaces: &Interfaces,
    iface_id: InterfaceId,
    lsp: Lsp,
) {
    // Discard LSPs failing the checksum; the originator's data is
    // unrecoverable.
    if !lsp.is_checksum_valid() {
        Debug::LspDiscard(level, &lsp).log();
        return;
    }

    let mut lsps = store.write();

    // The LSP is unknown or strictly newer than our copy: install it and
    // flood it everywhere but the interface it came from.
    if lsps.is_newer(&lsp) {
        Debug::LspInstall(level, &lsp).log();
        install_newer(&mut lsps, interfaces, iface_id, lsp);
        return;
    }

    let Some(entry) = lsps.get_mut(&lsp.lsp_id) else {
        return;
    };
    if lsp.seqno == entry.seqno() {
        process_same(entry, iface_id, lsp);
    } else {
        newer_local(entry, iface_id);
    }
}

// Installs a newer LSP: flood outbound on every other interface, acknowledge
// toward the sender.
fn install_newer(
    lsps: &mut LspMap,
    interfaces: &Interfaces,
    iface_id: InterfaceId,
    lsp: Lsp,
) {
    let mut entry = LsdbEntry::new(lsp);

    for iface in interfaces.iter_except(iface_id) {
        entry.set_srm(iface.id);
    }
    entry.clear_srm(iface_id);
    entry.set_ssn(iface_id);

    lsps.insert(entry);
}

// The received LSP matches our copy: acknowledge it, do not reflood.
fn process_same(entry: &mut LsdbEntry, iface_id: InterfaceId, lsp: Lsp) {
    // A matching receipt for an entry synthesized from a CSNP summary is the
    // requested LSP arriving: adopt its data.
    if entry.data().is_none() {
        entry.set_data(lsp);
    }

    entry.clear_srm(iface_id);
    entry.set_ssn(iface_id);
}

// Our copy is newer: flood it back toward the sender.
fn newer_local(entry: &mut LsdbEntry, iface_id: InterfaceId) {
    entry.set_srm(iface_id);
    entry.clear_ssn(iface_id);
}

// ===== CSNP receipt =====

fn process_csnp(
    level: LevelNumber,
    store: &LspStore,
    iface_id: InterfaceId,
    csnp: Snp,
) {
    let mut lsps = store.write();

    let entries = csnp.tlvs.lsp_entries().copied().collect::<Vec<_>>();
    for entry in &entries {
        process_csnp_lsp_entry(level, &mut lsps, iface_id, entry);
    }

    // Check for LSPs we hold that the neighbor did not describe. Setting SRM
    // propagates them.
    let Some((start, end)) = csnp.summary else {
        return;
    };
    if start > end {
        return;
    }
    let listed = entries
        .iter()
        .map(|entry| entry.lsp_id)
        .collect::<BTreeSet<_>>();
    for (_, entry) in lsps
        .range_mut(start..=end)
        .filter(|(lsp_id, _)| !listed.contains(*lsp_id))
    {
        // Sequence number zero is reserved for LSPs that were never
        // originated; those and expired entries are not propagated.
        if entry.rem_lifetime() == 0 || entry.seqno() == 0 {
            continue;
        }

        entry.set_srm(iface_id);
    }
}

fn process_csnp_lsp_entry(
    level: LevelNumber,
    lsps: &mut LspMap,
    iface_id: InterfaceId,
    lsp_entry: &LspEntry,
) {
    // The neighbor described an LSP we lack: create a summary-only entry and
    // request the full LSP through a PSNP.
    if !lsps.exists(&lsp_entry.lsp_id) {
        Debug::LspSummaryInstall(level, lsp_entry).log();
        let mut entry = LsdbEntry::new_summary(*lsp_entry);
        entry.set_ssn(iface_id);
        lsps.insert(entry);
        return;
    }

    let Some(entry) = lsps.get_mut(&lsp_entry.lsp_id) else {
        return;
    };
    if entry.same_as(lsp_entry) {
        // The sender already holds our copy.
        entry.clear_srm(iface_id);
    } else if entry.newer_in_db(lsp_entry) {
        // Flood our newer copy.
        entry.clear_ssn(iface_id);
        entry.set_srm(iface_id);
    } else if entry.older_in_db(lsp_entry) {
        // Request the newer copy.
        entry.clear_srm(iface_id);
        entry.set_ssn(iface_id);
    }
}

// ===== PSNP receipt =====

fn process_psnp(store: &LspStore, iface_id: InterfaceId, psnp: Snp) {
    let mut lsps = store.write();

    for lsp_entry in psnp.tlvs.lsp_entries() {
        // Unknown LSPIDs are silently ignored; the sender is a step behind
        // our purge.
        let Some(entry) = lsps.get_mut(&lsp_entry.lsp_id) else {
            continue;
        };

        entry.clear_srm(iface_id);
    }
}

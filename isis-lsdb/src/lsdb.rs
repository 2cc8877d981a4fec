//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
// Sponsored by NLnet as part of the Next Generation Internet initiative.
// See: https://nlnet.nl/NGI0
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, btree_map};
use std::ops::RangeInclusive;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bitflags::bitflags;

use crate::debug::Debug;
use crate::interface::InterfaceId;
use crate::packet::pdu::Lsp;
use crate::packet::tlv::LspEntry;
use crate::packet::{LevelNumber, LspId};

// Per-interface flooding flags.
//
// SRM: the LSP must still be flooded on the interface. SSN: a PSNP
// referencing the LSP is still owed on the interface.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct FloodFlags: u8 {
        const SRM = 0x01;
        const SSN = 0x02;
    }
}

// LSP database entry.
//
// An entry synthesized from a CSNP summary has no LSP data; the summary
// records what the neighbor advertised until the full LSP is fetched.
#[derive(Debug)]
pub struct LsdbEntry {
    data: Option<Lsp>,
    summary: LspEntry,
    flags: BTreeMap<InterfaceId, FloodFlags>,
}

// LSP database map, operated on under the store lock.
#[derive(Debug, Default)]
pub struct LspMap(BTreeMap<LspId, LsdbEntry>);

// The shared LSP store. A single reader/writer lock covers the whole map;
// every read-modify-write sequence on an entry's flags happens under one
// write guard.
#[derive(Debug, Default)]
pub struct LspStore {
    lsps: RwLock<LspMap>,
}

// ===== impl LsdbEntry =====

impl LsdbEntry {
    pub(crate) fn new(lsp: Lsp) -> LsdbEntry {
        LsdbEntry {
            summary: lsp.as_snp_entry(),
            data: Some(lsp),
            flags: Default::default(),
        }
    }

    pub(crate) fn new_summary(summary: LspEntry) -> LsdbEntry {
        LsdbEntry {
            data: None,
            summary,
            flags: Default::default(),
        }
    }

    pub fn data(&self) -> Option<&Lsp> {
        self.data.as_ref()
    }

    pub fn summary(&self) -> &LspEntry {
        &self.summary
    }

    pub fn seqno(&self) -> u32 {
        self.summary.seqno
    }

    pub fn rem_lifetime(&self) -> u16 {
        self.summary.rem_lifetime
    }

    // Adopts the full LSP data for an entry that was synthesized from a CSNP
    // summary.
    pub(crate) fn set_data(&mut self, lsp: Lsp) {
        self.summary = lsp.as_snp_entry();
        self.data = Some(lsp);
    }

    pub(crate) fn set_srm(&mut self, id: InterfaceId) {
        self.flags.entry(id).or_default().insert(FloodFlags::SRM);
    }

    pub(crate) fn clear_srm(&mut self, id: InterfaceId) {
        if let Some(flags) = self.flags.get_mut(&id) {
            flags.remove(FloodFlags::SRM);
        }
    }

    pub(crate) fn set_ssn(&mut self, id: InterfaceId) {
        self.flags.entry(id).or_default().insert(FloodFlags::SSN);
    }

    pub(crate) fn clear_ssn(&mut self, id: InterfaceId) {
        if let Some(flags) = self.flags.get_mut(&id) {
            flags.remove(FloodFlags::SSN);
        }
    }

    pub(crate) fn clear_all_ssn(&mut self) {
        for flags in self.flags.values_mut() {
            flags.remove(FloodFlags::SSN);
        }
    }

    pub fn srm_set(&self, id: InterfaceId) -> bool {
        self.flags
            .get(&id)
            .is_some_and(|flags| flags.contains(FloodFlags::SRM))
    }

    pub fn ssn_set(&self, id: InterfaceId) -> bool {
        self.flags
            .get(&id)
            .is_some_and(|flags| flags.contains(FloodFlags::SSN))
    }

    // Returns the interfaces the entry still needs to be flooded on.
    pub fn srm_interfaces(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        self.flags
            .iter()
            .filter(|(_, flags)| flags.contains(FloodFlags::SRM))
            .map(|(id, _)| *id)
    }

    // Compares the database copy against an inbound summary: sequence number
    // first, remaining lifetime as tiebreak.
    fn compare(&self, entry: &LspEntry) -> Ordering {
        let cmp = self.summary.seqno.cmp(&entry.seqno);
        if cmp != Ordering::Equal {
            return cmp;
        }

        self.summary.rem_lifetime.cmp(&entry.rem_lifetime)
    }

    pub(crate) fn same_as(&self, entry: &LspEntry) -> bool {
        self.compare(entry) == Ordering::Equal
    }

    pub(crate) fn newer_in_db(&self, entry: &LspEntry) -> bool {
        self.compare(entry) == Ordering::Greater
    }

    pub(crate) fn older_in_db(&self, entry: &LspEntry) -> bool {
        self.compare(entry) == Ordering::Less
    }

    fn decrement_rem_lifetime(&mut self) {
        self.summary.rem_lifetime -= 1;
        if let Some(data) = self.data.as_mut() {
            data.set_rem_lifetime(self.summary.rem_lifetime);
        }
    }
}

// ===== impl LspMap =====

impl LspMap {
    pub fn get(&self, lsp_id: &LspId) -> Option<&LsdbEntry> {
        self.0.get(lsp_id)
    }

    pub(crate) fn get_mut(&mut self, lsp_id: &LspId) -> Option<&mut LsdbEntry> {
        self.0.get_mut(lsp_id)
    }

    pub fn exists(&self, lsp_id: &LspId) -> bool {
        self.0.contains_key(lsp_id)
    }

    // Checks whether the given LSP is newer than the database copy. An LSP
    // absent from the database is always newer. Only sequence numbers are
    // compared on this path.
    pub fn is_newer(&self, lsp: &Lsp) -> bool {
        match self.0.get(&lsp.lsp_id) {
            Some(entry) => lsp.seqno > entry.seqno(),
            None => true,
        }
    }

    // Inserts the entry, replacing any existing one with the same LSPID.
    pub(crate) fn insert(&mut self, entry: LsdbEntry) {
        self.0.insert(entry.summary.lsp_id, entry);
    }

    pub fn delete(&mut self, lsp_id: &LspId) {
        self.0.remove(lsp_id);
    }

    // Snapshots the summary of every entry in the database.
    pub fn all_lsp_entries(&self) -> Vec<LspEntry> {
        self.0.values().map(|entry| entry.summary).collect()
    }

    // Marks every entry for flooding on the given interface. Used when a
    // neighbor comes up.
    pub(crate) fn set_srm_all(&mut self, id: InterfaceId) {
        for entry in self.0.values_mut() {
            entry.set_srm(id);
        }
    }

    // Collects the summaries of every entry owing a PSNP on the given
    // interface.
    pub(crate) fn entries_with_ssn(&self, id: InterfaceId) -> Vec<LspEntry> {
        self.0
            .values()
            .filter(|entry| entry.ssn_set(id))
            .map(|entry| entry.summary)
            .collect()
    }

    pub(crate) fn clear_all_ssn(&mut self) {
        for entry in self.0.values_mut() {
            entry.clear_all_ssn();
        }
    }

    pub(crate) fn range_mut(
        &mut self,
        range: RangeInclusive<LspId>,
    ) -> btree_map::RangeMut<'_, LspId, LsdbEntry> {
        self.0.range_mut(range)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LspId, &LsdbEntry)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // Ages every entry by one second, purging those whose remaining lifetime
    // is exhausted.
    pub(crate) fn decrement_rem_lifetimes(&mut self, level: LevelNumber) {
        let mut expired = vec![];

        for (lsp_id, entry) in self.0.iter_mut() {
            if entry.rem_lifetime() <= 1 {
                Debug::LspPurge(level, &entry.summary).log();
                expired.push(*lsp_id);
                continue;
            }

            entry.decrement_rem_lifetime();
        }

        for lsp_id in &expired {
            self.delete(lsp_id);
        }
    }
}

// ===== impl LspStore =====

impl LspStore {
    pub(crate) fn new() -> LspStore {
        Default::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, LspMap> {
        self.lsps.read().unwrap()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, LspMap> {
        self.lsps.write().unwrap()
    }

    pub fn all_lsp_entries(&self) -> Vec<LspEntry> {
        self.read().all_lsp_entries()
    }

    pub(crate) fn decrement_rem_lifetimes(&self, level: LevelNumber) {
        self.write().decrement_rem_lifetimes(level);
    }
}

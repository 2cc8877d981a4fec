//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
// Sponsored by NLnet as part of the Next Generation Internet initiative.
// See: https://nlnet.nl/NGI0
//

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc::UnboundedSender;

use crate::debug::Debug;
use crate::error::IoError;
use crate::packet::LevelNumber;
use crate::packet::pdu::{Lsp, Pdu, Snp};
use crate::tasks::messages::NetTxPduMsg;

// Interface identifier, unique within an interface manager.
//
// Flooding flags are keyed by this value.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InterfaceId(pub u32);

// Interface configuration relevant to LSDB synchronization.
#[derive(Clone, Debug)]
pub struct InterfaceCfg {
    pub passive: bool,
    pub mtu: u16,
}

#[derive(Debug, Default)]
struct InterfaceState {
    // Number of adjacencies in the Up state at level 2, maintained by the
    // neighbor manager.
    up_l2_neighbors: AtomicUsize,
}

// IS-IS interface as seen by the LSDB: link parameters plus the lower-layer
// send primitive. Packet I/O itself lives below this seam; outbound PDUs are
// handed to the interface's transmit channel.
#[derive(Debug)]
pub struct Interface {
    pub id: InterfaceId,
    pub name: String,
    pub cfg: InterfaceCfg,
    state: InterfaceState,
    net_tx_pdup: UnboundedSender<NetTxPduMsg>,
}

// Container holding every interface the LSDB floods on.
//
// The set is fixed at instance construction time. Interfaces hold no
// back-pointer to the database.
#[derive(Debug, Default)]
pub struct Interfaces {
    entries: Vec<Arc<Interface>>,
    next_id: u32,
}

// ===== impl Interface =====

impl Interface {
    pub fn is_passive(&self) -> bool {
        self.cfg.passive
    }

    pub fn mtu(&self) -> u16 {
        self.cfg.mtu
    }

    pub fn up_l2_neighbor_count(&self) -> usize {
        self.state.up_l2_neighbors.load(Ordering::Relaxed)
    }

    // Neighbor manager hook.
    pub fn set_up_l2_neighbor_count(&self, count: usize) {
        self.state.up_l2_neighbors.store(count, Ordering::Relaxed);
    }

    pub(crate) fn send_lspdu(&self, lsp: Lsp, level: LevelNumber) {
        self.send_pdu(Pdu::Lsp(lsp), level);
    }

    pub(crate) fn send_csnp(&self, csnp: Snp, level: LevelNumber) {
        self.send_pdu(Pdu::Snp(csnp), level);
    }

    pub(crate) fn send_psnp(&self, psnp: Snp, level: LevelNumber) {
        self.send_pdu(Pdu::Snp(psnp), level);
    }

    fn send_pdu(&self, pdu: Pdu, level: LevelNumber) {
        Debug::PduTx(level, &self.name, &pdu).log();

        let msg = NetTxPduMsg::new(self.name.clone(), level, pdu);
        if self.net_tx_pdup.send(msg).is_err() {
            IoError::SendError(self.name.clone()).log();
        }
    }
}

// ===== impl Interfaces =====

impl Interfaces {
    // Registers an interface, attaching the lower layer's transmit channel.
    pub fn insert(
        &mut self,
        name: &str,
        cfg: InterfaceCfg,
        net_tx_pdup: UnboundedSender<NetTxPduMsg>,
    ) -> Arc<Interface> {
        let id = InterfaceId(self.next_id);
        self.next_id += 1;

        let iface = Arc::new(Interface {
            id,
            name: name.to_owned(),
            cfg,
            state: Default::default(),
            net_tx_pdup,
        });
        self.entries.push(iface.clone());
        iface
    }

    pub fn get(&self, id: InterfaceId) -> Option<&Arc<Interface>> {
        self.entries.iter().find(|iface| iface.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Interface>> {
        self.entries.iter()
    }

    pub fn iter_except(
        &self,
        id: InterfaceId,
    ) -> impl Iterator<Item = &Arc<Interface>> {
        self.entries.iter().filter(move |iface| iface.id != id)
    }
}

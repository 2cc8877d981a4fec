//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
// Sponsored by NLnet as part of the Next Generation Internet initiative.
// See: https://nlnet.nl/NGI0
//

use tracing::{debug, debug_span};

use crate::packet::LevelNumber;
use crate::packet::pdu::{Lsp, Pdu};
use crate::packet::tlv::LspEntry;

// LSDB debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Instances
    InstanceStart(LevelNumber),
    InstanceStop(LevelNumber),
    // Network
    PduRx(LevelNumber, &'a str, &'a Pdu),
    PduTx(LevelNumber, &'a str, &'a Pdu),
    // LSDB maintenance
    LspInstall(LevelNumber, &'a Lsp),
    LspSummaryInstall(LevelNumber, &'a LspEntry),
    LspDiscard(LevelNumber, &'a Lsp),
    LspPurge(LevelNumber, &'a LspEntry),
    SrmSetAll(LevelNumber, &'a str),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceStart(level) | Debug::InstanceStop(level) => {
                debug_span!("lsdb", %level).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::PduRx(level, ifname, pdu) => {
                debug_span!("lsdb", %level).in_scope(|| {
                    debug_span!("input", interface = %ifname).in_scope(|| {
                        debug!(r#type = ?pdu.pdu_type(), "{}", self);
                    })
                })
            }
            Debug::PduTx(level, ifname, pdu) => {
                debug_span!("lsdb", %level).in_scope(|| {
                    debug_span!("output", interface = %ifname).in_scope(|| {
                        debug!(r#type = ?pdu.pdu_type(), "{}", self);
                    })
                })
            }
            Debug::LspInstall(level, lsp) => {
                debug_span!("lsdb", %level).in_scope(|| {
                    debug!(lsp_id = %lsp.lsp_id, seqno = %lsp.seqno, "{}", self);
                })
            }
            Debug::LspSummaryInstall(level, entry)
            | Debug::LspPurge(level, entry) => {
                debug_span!("lsdb", %level).in_scope(|| {
                    debug!(lsp_id = %entry.lsp_id, seqno = %entry.seqno, "{}", self);
                })
            }
            Debug::LspDiscard(level, lsp) => {
                debug_span!("lsdb", %level).in_scope(|| {
                    debug!(lsp_id = %lsp.lsp_id, seqno = %lsp.seqno, "{}", self);
                })
            }
            Debug::SrmSetAll(level, ifname) => {
                debug_span!("lsdb", %level).in_scope(|| {
                    debug!(interface = %ifname, "{}", self);
                })
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceStart(..) => {
                write!(f, "instance started")
            }
            Debug::InstanceStop(..) => {
                write!(f, "instance stopped")
            }
            Debug::PduRx(..) => {
                write!(f, "received PDU")
            }
            Debug::PduTx(..) => {
                write!(f, "sending PDU")
            }
            Debug::LspInstall(..) => {
                write!(f, "installing LSP")
            }
            Debug::LspSummaryInstall(..) => {
                write!(f, "installing LSP summary")
            }
            Debug::LspDiscard(..) => {
                write!(f, "discarding LSP")
            }
            Debug::LspPurge(..) => {
                write!(f, "purging expired LSP")
            }
            Debug::SrmSetAll(..) => {
                write!(f, "setting SRM flag on all LSPs")
            }
        }
    }
}

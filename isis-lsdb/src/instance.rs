//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
// Sponsored by NLnet as part of the Next Generation Internet initiative.
// See: https://nlnet.nl/NGI0
//

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::debug::Debug;
use crate::error::Error;
use crate::events;
use crate::interface::{InterfaceId, Interfaces};
use crate::lsdb::LspStore;
use crate::packet::pdu::Pdu;
use crate::packet::{LevelNumber, SystemId};
use crate::tasks;
use crate::tasks::{Ticker, Worker};

// The four tick sources driving an LSDB instance.
#[derive(Debug)]
pub struct LsdbTimers {
    pub decrement: Ticker,
    pub lsp_transmit: Ticker,
    pub csnp_transmit: Ticker,
    pub psnp_transmit: Ticker,
}

// Per-level IS-IS Link-State Database instance.
//
// The instance owns the LSP store and the four background routines that
// keep it synchronized: lifetime aging, LSPDU flooding, CSNP summaries and
// PSNP acknowledgements. Incoming PDUs enter through `process_pdu`.
#[derive(Debug)]
pub struct Lsdb {
    level: LevelNumber,
    system_id: SystemId,
    interfaces: Arc<Interfaces>,
    store: Arc<LspStore>,
    workers: Option<Workers>,
}

// Background routine handles, present while the instance is running.
#[derive(Debug)]
struct Workers {
    shutdown: watch::Sender<bool>,
    workers: Vec<Worker>,
}

// ===== impl LsdbTimers =====

impl LsdbTimers {
    // Standard protocol timers: one second aging granularity, ISO 10589
    // defaults for the transmission intervals.
    pub fn standard() -> LsdbTimers {
        LsdbTimers {
            decrement: Ticker::every(Duration::from_secs(1)),
            lsp_transmit: Ticker::every(Duration::from_secs(5)),
            csnp_transmit: Ticker::every(Duration::from_secs(10)),
            psnp_transmit: Ticker::every(Duration::from_secs(2)),
        }
    }
}

// ===== impl Lsdb =====

impl Lsdb {
    pub fn new(
        level: LevelNumber,
        system_id: SystemId,
        interfaces: Arc<Interfaces>,
    ) -> Lsdb {
        Lsdb {
            level,
            system_id,
            interfaces,
            store: Arc::new(LspStore::new()),
            workers: None,
        }
    }

    pub fn level(&self) -> LevelNumber {
        self.level
    }

    pub fn system_id(&self) -> SystemId {
        self.system_id
    }

    pub fn store(&self) -> &LspStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_some()
    }

    // Launches the four background routines with their injected tickers.
    //
    // The instance must be stopped first if it is already running.
    pub fn start(&mut self, timers: LsdbTimers) {
        Debug::InstanceStart(self.level).log();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = vec![
            tasks::decrement_rem_lifetimes(
                self.level,
                self.store.clone(),
                timers.decrement,
                shutdown_rx.clone(),
            ),
            tasks::send_lspdus(
                self.level,
                self.store.clone(),
                self.interfaces.clone(),
                timers.lsp_transmit,
                shutdown_rx.clone(),
            ),
            tasks::send_csnps(
                self.level,
                self.system_id,
                self.store.clone(),
                self.interfaces.clone(),
                timers.csnp_transmit,
                shutdown_rx.clone(),
            ),
            tasks::send_psnps(
                self.level,
                self.system_id,
                self.store.clone(),
                self.interfaces.clone(),
                timers.psnp_transmit,
                shutdown_rx,
            ),
        ];

        self.workers = Some(Workers {
            shutdown: shutdown_tx,
            workers,
        });
    }

    // Signals shutdown and waits until all four routines have exited. Each
    // routine finishes its current iteration before observing the signal.
    pub async fn stop(&mut self) {
        let Some(workers) = self.workers.take() else {
            return;
        };

        Debug::InstanceStop(self.level).log();

        let _ = workers.shutdown.send(true);
        for worker in workers.workers {
            worker.join().await;
        }
    }

    // Feeds a received PDU into the database.
    pub fn process_pdu(
        &self,
        iface_id: InterfaceId,
        pdu: Pdu,
    ) -> Result<(), Error> {
        events::process_pdu(
            self.level,
            &self.store,
            &self.interfaces,
            iface_id,
            pdu,
        )
    }

    // Marks every LSP for flooding on the given interface. Called when a
    // neighbor on that interface comes up.
    pub fn set_srm_all_lsps(&self, iface_id: InterfaceId) -> Result<(), Error> {
        let iface = self
            .interfaces
            .get(iface_id)
            .ok_or(Error::InterfaceIdNotFound(iface_id))?;

        Debug::SrmSetAll(self.level, &iface.name).log();
        self.store.write().set_srm_all(iface_id);

        Ok(())
    }
}

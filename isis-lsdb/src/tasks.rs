//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
// Sponsored by NLnet as part of the Next Generation Internet initiative.
// See: https://nlnet.nl/NGI0
//

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::{task, time};

use crate::interface::Interfaces;
use crate::lsdb::LspStore;
use crate::packet::pdu::Snp;
use crate::packet::{LanId, LevelNumber, SystemId};

//
// LSDB tasks diagram:
//
//                                  +--------------+
//              process_pdu (Nx) -> |              |
//                                  |              |
//         decrement ticker (1x) -> |              |
//      lsp-transmit ticker (1x) -> |     lsdb     | -> (Nx) net_tx_pdu
//     csnp-transmit ticker (1x) -> |              |
//     psnp-transmit ticker (1x) -> |              |
//                                  |              |
//                 shutdown (1x) -> |              |
//                                  +--------------+
//

// LSDB inter-task message types.
pub mod messages {
    use derive_new::new;
    use serde::Serialize;

    use crate::packet::LevelNumber;
    use crate::packet::pdu::Pdu;

    // Outbound PDU handed to the lower layer of an interface.
    #[derive(Debug)]
    #[derive(new)]
    #[derive(Serialize)]
    pub struct NetTxPduMsg {
        pub ifname: String,
        pub level: LevelNumber,
        pub pdu: Pdu,
    }
}

// Injected tick source driving one background routine.
//
// Production tickers fire on a fixed period; manual tickers are driven
// explicitly, which lets tests control time.
#[derive(Debug)]
pub struct Ticker {
    rx: mpsc::Receiver<()>,
    _worker: Option<Worker>,
}

// Driving end of a manual ticker.
#[derive(Clone, Debug)]
pub struct TickSender(mpsc::Sender<()>);

// Handle to one spawned background routine.
//
// Dropping the handle cancels the routine; `join` blocks until it has
// observed the shutdown signal and exited.
#[derive(Debug)]
pub(crate) struct Worker {
    join_handle: task::JoinHandle<()>,
}

// ===== impl Ticker =====

impl Ticker {
    // Creates a ticker firing every `period`. Ticks are coalesced while the
    // consumer is busy.
    pub fn every(period: Duration) -> Ticker {
        let (tx, rx) = mpsc::channel(1);
        let worker = Worker::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately.
            interval.tick().await;

            loop {
                interval.tick().await;
                match tx.try_send(()) {
                    Ok(()) | Err(TrySendError::Full(_)) => (),
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        });

        Ticker {
            rx,
            _worker: Some(worker),
        }
    }

    // Creates a manually driven ticker.
    pub fn manual() -> (TickSender, Ticker) {
        let (tx, rx) = mpsc::channel(4);
        (TickSender(tx), Ticker { rx, _worker: None })
    }

    pub(crate) async fn tick(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

// ===== impl TickSender =====

impl TickSender {
    pub async fn tick(&self) {
        let _ = self.0.send(()).await;
    }
}

// ===== impl Worker =====

impl Worker {
    fn spawn<Fut>(future: Fut) -> Worker
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        Worker {
            join_handle: task::spawn(future),
        }
    }

    pub(crate) async fn join(mut self) {
        let _ = (&mut self.join_handle).await;
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

// ===== LSDB background routines =====

// Remaining lifetime decrement routine.
pub(crate) fn decrement_rem_lifetimes(
    level: LevelNumber,
    store: Arc<LspStore>,
    mut ticker: Ticker,
    mut shutdown: watch::Receiver<bool>,
) -> Worker {
    Worker::spawn(async move {
        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    if tick.is_none() {
                        return;
                    }
                    store.decrement_rem_lifetimes(level);
                }
                _ = shutdown.changed() => return,
            }
        }
    })
}

// LSPDU transmit routine: floods every entry whose SRM flag is set.
pub(crate) fn send_lspdus(
    level: LevelNumber,
    store: Arc<LspStore>,
    interfaces: Arc<Interfaces>,
    mut ticker: Ticker,
    mut shutdown: watch::Receiver<bool>,
) -> Worker {
    Worker::spawn(async move {
        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    if tick.is_none() {
                        return;
                    }
                    send_all_lspdus(level, &store, &interfaces);
                }
                _ = shutdown.changed() => return,
            }
        }
    })
}

// CSNP transmit routine: describes the full database on every interface
// with at least one up L2 neighbor.
pub(crate) fn send_csnps(
    level: LevelNumber,
    system_id: SystemId,
    store: Arc<LspStore>,
    interfaces: Arc<Interfaces>,
    mut ticker: Ticker,
    mut shutdown: watch::Receiver<bool>,
) -> Worker {
    Worker::spawn(async move {
        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    if tick.is_none() {
                        return;
                    }
                    send_all_csnps(level, system_id, &store, &interfaces);
                }
                _ = shutdown.changed() => return,
            }
        }
    })
}

// PSNP transmit routine: acknowledges every entry whose SSN flag is set.
pub(crate) fn send_psnps(
    level: LevelNumber,
    system_id: SystemId,
    store: Arc<LspStore>,
    interfaces: Arc<Interfaces>,
    mut ticker: Ticker,
    mut shutdown: watch::Receiver<bool>,
) -> Worker {
    Worker::spawn(async move {
        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    if tick.is_none() {
                        return;
                    }
                    send_all_psnps(level, system_id, &store, &interfaces);
                }
                _ = shutdown.changed() => return,
            }
        }
    })
}

// ===== helper functions =====

fn send_all_lspdus(
    level: LevelNumber,
    store: &LspStore,
    interfaces: &Interfaces,
) {
    let lsps = store.read();

    for (_, entry) in lsps.iter() {
        // Entries synthesized from a CSNP summary carry no LSP to flood.
        let Some(data) = entry.data() else {
            continue;
        };

        for id in entry.srm_interfaces() {
            let Some(iface) = interfaces.get(id) else {
                continue;
            };
            if iface.is_passive() {
                continue;
            }

            // The SRM flag stays set until the LSP is acknowledged, so the
            // LSP is retransmitted on every tick until then.
            iface.send_lspdu(data.clone(), level);
        }
    }
}

fn send_all_csnps(
    level: LevelNumber,
    system_id: SystemId,
    store: &LspStore,
    interfaces: &Interfaces,
) {
    let source = LanId::from((system_id, 0));

    for iface in interfaces.iter() {
        if iface.up_l2_neighbor_count() < 1 {
            continue;
        }

        let entries = store.all_lsp_entries();
        for csnp in Snp::new_csnps(level, source, entries, iface.mtu()) {
            iface.send_csnp(csnp, level);
        }
    }
}

fn send_all_psnps(
    level: LevelNumber,
    system_id: SystemId,
    store: &LspStore,
    interfaces: &Interfaces,
) {
    let source = LanId::from((system_id, 0));

    // The whole sweep runs under the write lock since the SSN flags are
    // cleared at the end.
    let mut lsps = store.write();

    for iface in interfaces.iter() {
        if iface.is_passive() {
            continue;
        }

        let entries = lsps.entries_with_ssn(iface.id);
        for psnp in Snp::new_psnps(level, source, entries, iface.mtu()) {
            iface.send_psnp(psnp, level);
        }
    }

    lsps.clear_all_ssn();
}

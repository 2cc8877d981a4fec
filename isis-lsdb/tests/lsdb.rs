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

use isis_lsdb::instance::{Lsdb, LsdbTimers};
use isis_lsdb::interface::{Interface, InterfaceCfg, Interfaces};
use isis_lsdb::packet::pdu::{Lsp, LspFlags, LspTlvs, Pdu, Snp, SnpTlvs};
use isis_lsdb::packet::tlv::LspEntry;
use isis_lsdb::packet::{LanId, LevelNumber, LspId, SystemId};
use isis_lsdb::tasks::messages::NetTxPduMsg;
use isis_lsdb::tasks::{TickSender, Ticker};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;

//
// Test harness.
//
// The LSDB is started with manually driven tickers; each interface's
// transmit channel is kept so tests can assert on the PDUs the routines
// hand to the lower layer.
//

struct Ticks {
    decrement: TickSender,
    lsp: TickSender,
    csnp: TickSender,
    psnp: TickSender,
}

struct TestNet {
    lsdb: Lsdb,
    ifaces: Vec<Arc<Interface>>,
    rxs: Vec<UnboundedReceiver<NetTxPduMsg>>,
    ticks: Ticks,
}

fn active_cfg() -> InterfaceCfg {
    InterfaceCfg {
        passive: false,
        mtu: 1497,
    }
}

fn passive_cfg() -> InterfaceCfg {
    InterfaceCfg {
        passive: true,
        mtu: 1497,
    }
}

fn setup(cfgs: &[InterfaceCfg]) -> TestNet {
    let mut interfaces = Interfaces::default();
    let mut ifaces = vec![];
    let mut rxs = vec![];
    for (i, cfg) in cfgs.iter().enumerate() {
        let (tx, rx) = mpsc::unbounded_channel();
        let iface = interfaces.insert(&format!("eth{i}"), cfg.clone(), tx);
        ifaces.push(iface);
        rxs.push(rx);
    }

    let system_id = SystemId::from([0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
    let mut lsdb = Lsdb::new(LevelNumber::L2, system_id, Arc::new(interfaces));

    let (decrement, decrement_ticker) = Ticker::manual();
    let (lsp, lsp_ticker) = Ticker::manual();
    let (csnp, csnp_ticker) = Ticker::manual();
    let (psnp, psnp_ticker) = Ticker::manual();
    lsdb.start(LsdbTimers {
        decrement: decrement_ticker,
        lsp_transmit: lsp_ticker,
        csnp_transmit: csnp_ticker,
        psnp_transmit: psnp_ticker,
    });

    TestNet {
        lsdb,
        ifaces,
        rxs,
        ticks: Ticks {
            decrement,
            lsp,
            csnp,
            psnp,
        },
    }
}

fn lsp_id(system_id: u8) -> LspId {
    LspId::from([0x00, 0x00, 0x00, 0x00, 0x00, system_id, 0x00, 0x00])
}

fn lsp(system_id: u8, seqno: u32, rem_lifetime: u16) -> Lsp {
    Lsp::new(
        LevelNumber::L2,
        rem_lifetime,
        lsp_id(system_id),
        seqno,
        LspFlags::default(),
        LspTlvs::default(),
    )
}

fn peer_source() -> LanId {
    LanId::from([0x00, 0x00, 0x00, 0x00, 0x00, 0xaa, 0x00])
}

fn csnp_full_range(entries: Vec<LspEntry>) -> Pdu {
    Pdu::Snp(Snp::new(
        LevelNumber::L2,
        peer_source(),
        Some((LspId::from([0x00; 8]), LspId::from([0xff; 8]))),
        SnpTlvs::new(entries),
    ))
}

fn psnp(entries: Vec<LspEntry>) -> Pdu {
    Pdu::Snp(Snp::new(
        LevelNumber::L2,
        peer_source(),
        None,
        SnpTlvs::new(entries),
    ))
}

async fn recv(rx: &mut UnboundedReceiver<NetTxPduMsg>) -> NetTxPduMsg {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an outbound PDU")
        .expect("transmit channel closed")
}

fn assert_no_pdu(rx: &mut UnboundedReceiver<NetTxPduMsg>) {
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for condition");
}

//
// Test cases.
//

// A new LSP is flooded on every interface except the one it arrived on,
// and acknowledged toward the sender.
#[tokio::test]
async fn flood_on_new_lsp() {
    let mut net = setup(&[active_cfg(), active_cfg(), active_cfg()]);
    let (a, b, c) = (net.ifaces[0].id, net.ifaces[1].id, net.ifaces[2].id);

    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 5, 1200)))
        .unwrap();

    {
        let lsps = net.lsdb.store().read();
        let entry = lsps.get(&lsp_id(0x10)).unwrap();
        assert_eq!(entry.seqno(), 5);
        assert!(!entry.srm_set(a));
        assert!(entry.srm_set(b));
        assert!(entry.srm_set(c));
        assert!(entry.ssn_set(a));
    }

    net.ticks.lsp.tick().await;
    let msg = recv(&mut net.rxs[1]).await;
    assert_eq!(msg.ifname, "eth1");
    assert!(matches!(msg.pdu, Pdu::Lsp(ref lsp) if lsp.seqno == 5));
    let msg = recv(&mut net.rxs[2]).await;
    assert_eq!(msg.ifname, "eth2");

    // The arrival interface must not be flooded.
    assert_no_pdu(&mut net.rxs[0]);
}

// A PSNP acknowledgement clears the SRM flag for its interface only.
#[tokio::test]
async fn psnp_ack_clears_srm() {
    let mut net = setup(&[active_cfg(), active_cfg(), active_cfg()]);
    let (a, b, c) = (net.ifaces[0].id, net.ifaces[1].id, net.ifaces[2].id);

    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 5, 1200)))
        .unwrap();

    let entry = *net.lsdb.store().read().get(&lsp_id(0x10)).unwrap().summary();
    net.lsdb.process_pdu(b, psnp(vec![entry])).unwrap();

    {
        let lsps = net.lsdb.store().read();
        let entry = lsps.get(&lsp_id(0x10)).unwrap();
        assert!(!entry.srm_set(b));
        assert!(entry.srm_set(c));
    }

    net.ticks.lsp.tick().await;
    let msg = recv(&mut net.rxs[2]).await;
    assert_eq!(msg.ifname, "eth2");
    assert_no_pdu(&mut net.rxs[0]);
    assert_no_pdu(&mut net.rxs[1]);
}

// An acknowledgement for an unknown LSP is silently ignored.
#[tokio::test]
async fn psnp_unknown_ignored() {
    let net = setup(&[active_cfg()]);
    let a = net.ifaces[0].id;

    let stranger = LspEntry {
        rem_lifetime: 100,
        lsp_id: lsp_id(0x66),
        seqno: 9,
        cksum: 0x1234,
    };
    net.lsdb.process_pdu(a, psnp(vec![stranger])).unwrap();

    assert!(net.lsdb.store().read().is_empty());
}

// Receiving an older LSP triggers reflooding of the local newer copy back
// toward the sender.
#[tokio::test]
async fn older_lsp_refloods_local_copy() {
    let net = setup(&[active_cfg(), active_cfg()]);
    let (a, b) = (net.ifaces[0].id, net.ifaces[1].id);

    net.lsdb
        .process_pdu(b, Pdu::Lsp(lsp(0x10, 7, 1200)))
        .unwrap();
    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 3, 1200)))
        .unwrap();

    let lsps = net.lsdb.store().read();
    let entry = lsps.get(&lsp_id(0x10)).unwrap();
    // The stored sequence number is the maximum ever accepted.
    assert_eq!(entry.seqno(), 7);
    assert!(entry.srm_set(a));
    assert!(!entry.ssn_set(a));
}

// Receiving the same sequence number acknowledges without reflooding.
#[tokio::test]
async fn same_lsp_acknowledged() {
    let net = setup(&[active_cfg(), active_cfg()]);
    let (a, b) = (net.ifaces[0].id, net.ifaces[1].id);

    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 5, 1200)))
        .unwrap();
    // The copy flooded to B comes back from B's side of the link.
    net.lsdb
        .process_pdu(b, Pdu::Lsp(lsp(0x10, 5, 1200)))
        .unwrap();

    let lsps = net.lsdb.store().read();
    let entry = lsps.get(&lsp_id(0x10)).unwrap();
    assert_eq!(entry.seqno(), 5);
    assert!(!entry.srm_set(b));
    assert!(entry.ssn_set(b));
}

// An unacknowledged LSP is retransmitted on every tick.
#[tokio::test]
async fn unacknowledged_lsp_retransmitted() {
    let mut net = setup(&[active_cfg(), active_cfg()]);
    let a = net.ifaces[0].id;

    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 5, 1200)))
        .unwrap();

    net.ticks.lsp.tick().await;
    recv(&mut net.rxs[1]).await;
    net.ticks.lsp.tick().await;
    recv(&mut net.rxs[1]).await;

    // The store is unchanged by transmission.
    let lsps = net.lsdb.store().read();
    assert!(lsps.get(&lsp_id(0x10)).unwrap().srm_set(net.ifaces[1].id));
}

// A CSNP listing an LSP we lack creates a summary-only entry and schedules
// a request for the full LSP.
#[tokio::test]
async fn csnp_unknown_entry_requested() {
    let mut net = setup(&[active_cfg()]);
    let a = net.ifaces[0].id;

    let advertised = LspEntry {
        rem_lifetime: 1000,
        lsp_id: lsp_id(0x20),
        seqno: 2,
        cksum: 0x4242,
    };
    net.lsdb
        .process_pdu(a, csnp_full_range(vec![advertised]))
        .unwrap();

    {
        let lsps = net.lsdb.store().read();
        let entry = lsps.get(&lsp_id(0x20)).unwrap();
        assert_eq!(entry.seqno(), 2);
        assert!(entry.data().is_none());
        assert!(entry.ssn_set(a));
        assert!(!entry.srm_set(a));
    }

    // The PSNP transmit tick requests the LSP and clears SSN.
    net.ticks.psnp.tick().await;
    let msg = recv(&mut net.rxs[0]).await;
    let Pdu::Snp(snp) = msg.pdu else {
        panic!("expected an SNP");
    };
    assert!(snp.summary.is_none());
    assert_eq!(
        snp.tlvs.lsp_entries().map(|e| e.lsp_id).collect::<Vec<_>>(),
        vec![lsp_id(0x20)]
    );

    wait_for(|| {
        !net.lsdb
            .store()
            .read()
            .get(&lsp_id(0x20))
            .unwrap()
            .ssn_set(a)
    })
    .await;
}

// The requested LSP arriving with the recorded sequence number fills in the
// summary-only entry.
#[tokio::test]
async fn summary_entry_adopts_fetched_lsp() {
    let net = setup(&[active_cfg()]);
    let a = net.ifaces[0].id;

    let fetched = lsp(0x20, 2, 1000);
    let advertised = fetched.as_snp_entry();
    net.lsdb
        .process_pdu(a, csnp_full_range(vec![advertised]))
        .unwrap();
    net.lsdb.process_pdu(a, Pdu::Lsp(fetched)).unwrap();

    let lsps = net.lsdb.store().read();
    let entry = lsps.get(&lsp_id(0x20)).unwrap();
    assert_eq!(entry.seqno(), 2);
    assert!(entry.data().is_some());
}

// An LSP we hold that falls inside the CSNP range but is not listed gets
// flooded to the sender.
#[tokio::test]
async fn csnp_gap_triggers_flooding() {
    let net = setup(&[active_cfg()]);
    let a = net.ifaces[0].id;

    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 4, 900)))
        .unwrap();
    assert!(!net.lsdb.store().read().get(&lsp_id(0x10)).unwrap().srm_set(a));

    net.lsdb.process_pdu(a, csnp_full_range(vec![])).unwrap();

    let lsps = net.lsdb.store().read();
    assert!(lsps.get(&lsp_id(0x10)).unwrap().srm_set(a));
}

// LSPs outside the advertised range are not treated as gaps.
#[tokio::test]
async fn csnp_out_of_range_not_flooded() {
    let net = setup(&[active_cfg()]);
    let a = net.ifaces[0].id;

    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 4, 900)))
        .unwrap();

    // Range that ends before our entry.
    let csnp = Pdu::Snp(Snp::new(
        LevelNumber::L2,
        peer_source(),
        Some((LspId::from([0x00; 8]), lsp_id(0x01))),
        SnpTlvs::new(vec![]),
    ));
    net.lsdb.process_pdu(a, csnp).unwrap();

    let lsps = net.lsdb.store().read();
    assert!(!lsps.get(&lsp_id(0x10)).unwrap().srm_set(a));
}

// A CSNP describing exactly our database clears SRM on its interface and
// creates nothing new; processing it twice is idempotent.
#[tokio::test]
async fn csnp_identical_database_idempotent() {
    let net = setup(&[active_cfg(), active_cfg()]);
    let (a, b) = (net.ifaces[0].id, net.ifaces[1].id);

    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 5, 1200)))
        .unwrap();
    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x11, 3, 1200)))
        .unwrap();

    let snapshot = net.lsdb.store().all_lsp_entries();
    assert_eq!(snapshot.len(), 2);

    for _ in 0..2 {
        net.lsdb
            .process_pdu(b, csnp_full_range(snapshot.clone()))
            .unwrap();

        let lsps = net.lsdb.store().read();
        assert_eq!(lsps.len(), 2);
        for (_, entry) in lsps.iter() {
            assert!(entry.data().is_some());
            assert!(!entry.srm_set(b));
        }
    }
}

// A CSNP listing a newer copy of an LSP we hold schedules a request and
// stops our own flooding on that interface.
#[tokio::test]
async fn csnp_newer_entry_requested() {
    let net = setup(&[active_cfg(), active_cfg()]);
    let (a, b) = (net.ifaces[0].id, net.ifaces[1].id);

    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 5, 1200)))
        .unwrap();

    let newer = LspEntry {
        rem_lifetime: 1200,
        lsp_id: lsp_id(0x10),
        seqno: 6,
        cksum: 0x5151,
    };
    net.lsdb.process_pdu(b, csnp_full_range(vec![newer])).unwrap();

    let lsps = net.lsdb.store().read();
    let entry = lsps.get(&lsp_id(0x10)).unwrap();
    assert!(!entry.srm_set(b));
    assert!(entry.ssn_set(b));
    // Local copy is untouched until the newer LSP actually arrives.
    assert_eq!(entry.seqno(), 5);
}

// Aging: each tick decrements the remaining lifetime; an entry at one
// second is purged.
#[tokio::test]
async fn aging_decrements_and_purges() {
    let net = setup(&[active_cfg()]);
    let a = net.ifaces[0].id;

    net.lsdb.process_pdu(a, Pdu::Lsp(lsp(0x10, 1, 2))).unwrap();

    net.ticks.decrement.tick().await;
    wait_for(|| {
        net.lsdb
            .store()
            .read()
            .get(&lsp_id(0x10))
            .is_some_and(|entry| entry.rem_lifetime() == 1)
    })
    .await;

    net.ticks.decrement.tick().await;
    wait_for(|| net.lsdb.store().read().is_empty()).await;
}

// Passive interfaces are never sent LSPDUs or PSNPs, whatever the flag
// state says.
#[tokio::test]
async fn passive_interface_never_transmits() {
    let mut net = setup(&[active_cfg(), passive_cfg()]);
    let (a, p) = (net.ifaces[0].id, net.ifaces[1].id);

    // Flooding marks the passive interface like any other.
    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 5, 1200)))
        .unwrap();
    assert!(net.lsdb.store().read().get(&lsp_id(0x10)).unwrap().srm_set(p));

    // Request flag on the passive interface.
    let advertised = LspEntry {
        rem_lifetime: 1000,
        lsp_id: lsp_id(0x20),
        seqno: 2,
        cksum: 0x4242,
    };
    net.lsdb
        .process_pdu(p, csnp_full_range(vec![advertised]))
        .unwrap();
    assert!(net.lsdb.store().read().get(&lsp_id(0x20)).unwrap().ssn_set(p));

    net.ticks.lsp.tick().await;
    net.ticks.psnp.tick().await;

    // The active interface still owes an acknowledgement for the first LSP;
    // the passive one stays quiet despite both flags being set.
    let msg = recv(&mut net.rxs[0]).await;
    assert!(matches!(msg.pdu, Pdu::Snp(_)));
    assert_no_pdu(&mut net.rxs[0]);
    assert_no_pdu(&mut net.rxs[1]);
}

// CSNPs are only emitted on interfaces with an up L2 neighbor; an empty
// database is described by a single full-range CSNP.
#[tokio::test]
async fn csnp_emission_gated_by_neighbors() {
    let mut net = setup(&[active_cfg(), active_cfg()]);

    net.ifaces[0].set_up_l2_neighbor_count(1);

    net.ticks.csnp.tick().await;
    let msg = recv(&mut net.rxs[0]).await;
    let Pdu::Snp(snp) = msg.pdu else {
        panic!("expected an SNP");
    };
    assert_eq!(
        snp.summary,
        Some((LspId::from([0x00; 8]), LspId::from([0xff; 8])))
    );
    assert_eq!(snp.tlvs.lsp_entries().count(), 0);

    // No neighbors, no summaries.
    assert_no_pdu(&mut net.rxs[1]);
}

// A PSNP tick with no SSN flags set emits nothing.
#[tokio::test]
async fn psnp_suppressed_when_nothing_owed() {
    let mut net = setup(&[active_cfg()]);

    net.ticks.psnp.tick().await;
    net.ticks.psnp.tick().await;
    assert_no_pdu(&mut net.rxs[0]);
}

// A neighbor coming up triggers a full database flood on its interface.
#[tokio::test]
async fn neighbor_up_floods_database() {
    let net = setup(&[active_cfg(), active_cfg()]);
    let (a, b) = (net.ifaces[0].id, net.ifaces[1].id);

    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 5, 1200)))
        .unwrap();
    let entry = *net.lsdb.store().read().get(&lsp_id(0x10)).unwrap().summary();

    // B acknowledged everything already.
    net.lsdb.process_pdu(b, psnp(vec![entry])).unwrap();
    net.lsdb.set_srm_all_lsps(b).unwrap();

    let lsps = net.lsdb.store().read();
    assert!(lsps.get(&lsp_id(0x10)).unwrap().srm_set(b));
}

// Stopping the instance joins all four routines; later ticks are inert.
#[tokio::test]
async fn stop_joins_all_routines() {
    let mut net = setup(&[active_cfg()]);
    let a = net.ifaces[0].id;

    net.lsdb
        .process_pdu(a, Pdu::Lsp(lsp(0x10, 5, 1200)))
        .unwrap();

    net.lsdb.stop().await;
    assert!(!net.lsdb.is_running());

    net.ticks.lsp.tick().await;
    net.ticks.psnp.tick().await;
    net.ticks.csnp.tick().await;
    net.ticks.decrement.tick().await;
    tokio::task::yield_now().await;
    assert_no_pdu(&mut net.rxs[0]);

    // The database itself outlives the routines.
    assert_eq!(net.lsdb.store().read().len(), 1);
}

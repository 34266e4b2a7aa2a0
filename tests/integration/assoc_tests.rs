//! Association tracking driven by unsolicited events.

use std::cell::RefCell;
use std::rc::Rc;

use wnc_driver::Error;
use wnc_driver::events::DataReady;
use wnc_driver::nc::cmds::{
    AEC_ID_ASSOC, AEC_ID_WAPSC, AEC_ID_WAPSD, AEC_ID_WSTALD, AEC_ID_WSTALU, CMD_ID_ASSOC, CMD_ID_WSTADISC,
};
use wnc_driver::nc::elem::{MacAddr, Param};
use wnc_driver::wdrv::assoc::{AssocRole, ConnEvent};

use crate::mock_dev::{driver, pump, take_one};

const BSSID: MacAddr = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
const PEER: MacAddr = [0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0xee];

#[test]
fn station_lifecycle() {
    let mut w = driver();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    w.assoc_set_connect_callback(Some(Box::new(move |_, ev| sink.borrow_mut().push(ev))));

    let sta = w.assoc_station();
    assert_eq!(w.assoc_peer_address_get(sta), Err(Error::RequestError));

    w.transport_mut()
        .aec(AEC_ID_WSTALU, &[Param::Uint(4), Param::Mac(BSSID), Param::Uint(11)]);
    pump(&mut w);
    assert_eq!(*events.borrow(), [ConnEvent::Connected]);
    assert_eq!(w.assoc_role(), Some(AssocRole::Station));
    assert_eq!(w.assoc_peer_address_get(sta), Ok(BSSID));

    // No cached value yet; a callback forces a query.
    assert_eq!(w.assoc_rssi_get(sta, None), Err(Error::RequestError));
    let rssi = Rc::new(RefCell::new(None));
    let sink = rssi.clone();
    assert_eq!(
        w.assoc_rssi_get(sta, Some(Box::new(move |_, v| *sink.borrow_mut() = Some(v)))),
        Err(Error::RetryRequest)
    );

    let query = take_one(&mut w);
    assert_eq!(query.cmd_id, CMD_ID_ASSOC);
    assert_eq!(query.elems()[0].as_u64(), Some(4));
    let nc = w.transport_mut();
    nc.rsp(&query, CMD_ID_ASSOC, &[Param::Uint(4), Param::Bool(false), Param::Mac(BSSID), Param::Int(-57)]);
    nc.ok(&query);
    pump(&mut w);

    assert_eq!(*rssi.borrow(), Some(-57));
    assert_eq!(w.assoc_rssi_get(sta, None), Ok(-57));

    w.assoc_disconnect(sta).unwrap();
    let disc = take_one(&mut w);
    assert_eq!(disc.cmd_id, CMD_ID_WSTADISC);
    let nc = w.transport_mut();
    nc.ok(&disc);
    nc.aec(AEC_ID_WSTALD, &[Param::Uint(4)]);
    pump(&mut w);

    assert_eq!(*events.borrow(), [ConnEvent::Connected, ConnEvent::Disconnected]);
    assert_eq!(w.assoc_peer_address_get(sta), Err(Error::RequestError));
    assert_eq!(w.assoc_disconnect(sta), Err(Error::RequestError));
}

#[test]
fn unsolicited_rssi_updates_cache() {
    let mut w = driver();
    let sta = w.assoc_station();
    let nc = w.transport_mut();
    nc.aec(AEC_ID_WSTALU, &[Param::Uint(1), Param::Mac(BSSID), Param::Uint(6)]);
    nc.aec(AEC_ID_ASSOC, &[Param::Uint(1), Param::Bool(false), Param::Mac(BSSID), Param::Int(-63)]);
    pump(&mut w);

    assert_eq!(w.assoc_rssi_get(sta, None), Ok(-63));
    assert!(w.transport_mut().take_sent().is_empty());
}

#[test]
fn access_point_peers_come_and_go() {
    let mut w = driver();
    assert!(w.assoc_find_sta_info(None).is_some());

    w.transport_mut().aec(AEC_ID_WAPSC, &[Param::Uint(2), Param::Mac(PEER)]);
    pump(&mut w);
    assert_eq!(w.assoc_role(), Some(AssocRole::AccessPoint));

    let peer = w.assoc_find_sta_info(Some(&PEER)).expect("peer tracked");
    assert_eq!(w.assoc_peer_address_get(peer), Ok(PEER));
    assert_eq!(w.assoc_disconnect(peer), Err(Error::OperationNotSupported));

    w.transport_mut().aec(AEC_ID_WAPSD, &[Param::Uint(2), Param::Mac(PEER)]);
    pump(&mut w);
    assert!(w.assoc_find_sta_info(Some(&PEER)).is_none());
    assert_eq!(w.assoc_peer_address_get(peer), Err(Error::NotConnected));
}

#[test]
fn data_ready_flag_drives_the_pump() {
    static LINE: DataReady = DataReady::new();

    let mut w = driver();
    let sta = w.assoc_station();
    w.transport_mut()
        .aec(AEC_ID_WSTALU, &[Param::Uint(9), Param::Mac(BSSID), Param::Uint(1)]);
    LINE.signal();

    assert!(LINE.take());
    assert!(w.handle_event(|| LINE.is_pending()));
    assert_eq!(w.assoc_peer_address_get(sta), Ok(BSSID));
    assert_eq!(LINE.signal_count(), 1);
}

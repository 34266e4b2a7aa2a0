//! Regulatory-domain negotiation over the scripted co-processor.

use std::cell::RefCell;
use std::rc::Rc;

use wnc_driver::Error;
use wnc_driver::config::DriverConfig;
use wnc_driver::nc::cmds::{CMD_ID_WIFIC, WIFIC_REGDOMAIN_AVAILABLE, WIFIC_REGDOMAIN_CHANMASK24, WIFIC_REGDOMAIN_SELECTED};
use wnc_driver::nc::elem::{FractInt, Param};
use wnc_driver::wdrv::Wdrv;
use wnc_driver::wdrv::regdomain::{RegDomainCallback, RegDomainSelect};

use crate::mock_dev::{MockNc, SentCmd, driver, pump, take_one};

type Reports = Rc<RefCell<Vec<(u8, u8, bool, Option<String>, u16)>>>;

fn recorder() -> (Reports, RegDomainCallback) {
    let reports: Reports = Rc::default();
    let sink = reports.clone();
    let cb: RegDomainCallback = Box::new(move |i, n, cur, info| {
        sink.borrow_mut().push((
            i,
            n,
            cur,
            info.map(|d| String::from_utf8_lossy(d.name()).into_owned()),
            info.map_or(0, |d| d.channel_mask),
        ));
    });
    (reports, cb)
}

fn wific_id(id: u16, index: i16) -> Param<'static> {
    Param::Frac(FractInt::new(id, index))
}

/// Answer a SELECTED + CHANMASK24 read burst.
fn answer_current(w: &mut Wdrv<MockNc>, name: &[u8], mask: u64) {
    let sent = w.transport_mut().take_sent();
    assert_eq!(sent.len(), 2);
    let (sel, chan): (&SentCmd, &SentCmd) = (&sent[0], &sent[1]);
    assert_eq!(sel.elems()[0].as_u64(), Some(u64::from(WIFIC_REGDOMAIN_SELECTED)));
    assert_eq!(chan.elems()[0].as_u64(), Some(u64::from(WIFIC_REGDOMAIN_CHANMASK24)));

    let nc = w.transport_mut();
    nc.rsp(sel, CMD_ID_WIFIC, &[wific_id(WIFIC_REGDOMAIN_SELECTED, 0), Param::Str(name)]);
    nc.rsp(chan, CMD_ID_WIFIC, &[wific_id(WIFIC_REGDOMAIN_CHANMASK24, 0), Param::Uint(mask)]);
    nc.ok(sel);
    nc.ok(chan);
    pump(w);
}

fn ack_set(w: &mut Wdrv<MockNc>, name: &[u8]) {
    let set = take_one(w);
    assert_eq!(set.cmd_id, CMD_ID_WIFIC);
    assert_eq!(set.num_params, 2);
    assert_eq!(set.elems()[1].as_bytes(), Some(name));

    let nc = w.transport_mut();
    nc.rsp(&set, CMD_ID_WIFIC, &[wific_id(WIFIC_REGDOMAIN_SELECTED, 0), Param::Str(name)]);
    nc.ok(&set);
    pump(w);
}

#[test]
fn set_is_confirmed_by_read_back() {
    let mut w = driver();
    let (reports, cb) = recorder();

    w.regdomain_set(b"ETSI", cb).unwrap();
    ack_set(&mut w, b"ETSI");
    assert!(reports.borrow().is_empty());

    answer_current(&mut w, b"ETSI", 0x1fff);
    assert_eq!(*reports.borrow(), [(1, 1, true, Some("ETSI".to_string()), 0x1fff)]);
    assert_eq!(w.regdomain_active().name(), b"ETSI");
    assert_eq!(w.regdomain_active().channel_mask, 0x1fff);
}

#[test]
fn unchanged_read_back_retries_then_fails() {
    let mut w = Wdrv::new(
        MockNc::new(),
        &DriverConfig {
            regdomain_max_retries: 1,
            ..DriverConfig::default()
        },
    )
    .unwrap();
    let (reports, cb) = recorder();

    w.regdomain_set(b"FCC", cb).unwrap();
    ack_set(&mut w, b"FCC");
    answer_current(&mut w, b"FCC", 0x7ff);
    assert_eq!(*reports.borrow(), [(1, 1, true, Some("FCC".to_string()), 0x7ff)]);

    let (reports, cb) = recorder();
    w.regdomain_set(b"ETSI", cb).unwrap();
    ack_set(&mut w, b"ETSI");
    answer_current(&mut w, b"FCC", 0x7ff);
    answer_current(&mut w, b"FCC", 0x7ff);

    assert_eq!(*reports.borrow(), [(0, 0, false, None, 0)]);
    assert!(w.transport_mut().take_sent().is_empty());
}

#[test]
fn second_request_while_pending_is_refused() {
    let mut w = driver();
    let (first, cb) = recorder();
    w.regdomain_set(b"JP", cb).unwrap();

    let (second, cb) = recorder();
    assert_eq!(w.regdomain_get(RegDomainSelect::Current, cb), Err(Error::RetryRequest));
    let (_, cb) = recorder();
    assert_eq!(w.regdomain_set(b"ETSI", cb), Err(Error::RetryRequest));

    ack_set(&mut w, b"JP");
    answer_current(&mut w, b"JP", 0x3fff);
    assert!(second.borrow().is_empty());
    assert_eq!(*first.borrow(), [(1, 1, true, Some("JP".to_string()), 0x3fff)]);
    assert_eq!(w.regdomain_active().name(), b"JP");
    assert_eq!(w.regdomain_active().channel_mask, 0x3fff);

    let (later, cb) = recorder();
    w.regdomain_get(RegDomainSelect::Current, cb).unwrap();
    answer_current(&mut w, b"JP", 0x3fff);
    assert_eq!(*later.borrow(), [(1, 1, true, Some("JP".to_string()), 0x3fff)]);
}

#[test]
fn list_all_marks_current_entry() {
    let mut w = driver();
    let (_, cb) = recorder();
    w.regdomain_set(b"ETSI", cb).unwrap();
    ack_set(&mut w, b"ETSI");
    answer_current(&mut w, b"ETSI", 0x1fff);

    let (reports, cb) = recorder();
    w.regdomain_get(RegDomainSelect::All, cb).unwrap();
    let cmd = take_one(&mut w);
    assert_eq!(cmd.elems()[0].as_u64(), Some(u64::from(WIFIC_REGDOMAIN_AVAILABLE)));

    let nc = w.transport_mut();
    nc.rsp(&cmd, CMD_ID_WIFIC, &[wific_id(WIFIC_REGDOMAIN_AVAILABLE, -1), Param::Uint(2)]);
    nc.rsp(&cmd, CMD_ID_WIFIC, &[wific_id(WIFIC_REGDOMAIN_AVAILABLE, 0), Param::Str(b"FCC")]);
    nc.rsp(&cmd, CMD_ID_WIFIC, &[wific_id(WIFIC_REGDOMAIN_AVAILABLE, 1), Param::Str(b"ETSI")]);
    nc.ok(&cmd);
    pump(&mut w);

    assert_eq!(*reports.borrow(), [
        (1, 2, false, Some("FCC".to_string()), 0),
        (2, 2, true, Some("ETSI".to_string()), 0x1fff),
    ]);

    let (_, cb) = recorder();
    assert!(w.regdomain_get(RegDomainSelect::Current, cb).is_ok());
}

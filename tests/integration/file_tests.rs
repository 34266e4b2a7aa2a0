//! File transfer sessions end to end over the scripted co-processor.

use std::cell::RefCell;
use std::rc::Rc;

use wnc_driver::Error;
use wnc_driver::nc::BusState;
use wnc_driver::nc::cmds::{CMD_ID_FS, CMD_ID_FSRECV, CMD_ID_FSTSFR, FS_OP_DEL, FS_OP_LIST, FS_OP_LOAD, FS_OP_STORE};
use wnc_driver::nc::elem::Param;
use wnc_driver::wdrv::Wdrv;
use wnc_driver::wdrv::file::{FileEvent, FileHandle, FileMode, FileStatusCallback, FileType, FindEvent};

use crate::mock_dev::{MockNc, driver, pump, take_one};

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Error,
    Open,
    WriteComplete,
    Read(Vec<u8>),
    Close,
}

type Log = Rc<RefCell<Vec<Seen>>>;

fn recorder() -> (Log, FileStatusCallback) {
    let log: Log = Rc::default();
    let sink = log.clone();
    let cb: FileStatusCallback = Box::new(move |_, ev| {
        sink.borrow_mut().push(match ev {
            FileEvent::Error => Seen::Error,
            FileEvent::Open => Seen::Open,
            FileEvent::WriteComplete => Seen::WriteComplete,
            FileEvent::ReadComplete(data) => Seen::Read(data.to_vec()),
            FileEvent::Close => Seen::Close,
        });
    });
    (log, cb)
}

/// Open a session and answer the open with transfer handle `tsfr`.
fn open(w: &mut Wdrv<MockNc>, mode: FileMode, len: u32, tsfr: u64) -> (FileHandle, Log) {
    let (log, cb) = recorder();
    let h = w.file_open(b"cert.pem", FileType::Certs, mode, len, cb).expect("slot available");

    let cmd = take_one(w);
    assert_eq!(cmd.cmd_id, CMD_ID_FS);
    let op = if mode == FileMode::Write { FS_OP_LOAD } else { FS_OP_STORE };
    let e = cmd.elems();
    assert_eq!(e[0].as_u64(), Some(u64::from(op)));
    assert_eq!(e[1].as_u64(), Some(FileType::Certs as u64));
    assert_eq!(e[2].as_bytes(), Some(&b"cert.pem"[..]));

    let nc = w.transport_mut();
    nc.rsp(&cmd, CMD_ID_FS, &[Param::Uint(u64::from(op)), Param::Uint(tsfr)]);
    nc.ok(&cmd);
    pump(w);
    assert_eq!(*log.borrow(), [Seen::Open]);
    log.borrow_mut().clear();
    (h, log)
}

#[test]
fn write_session_streams_blocks() {
    let mut w = driver();
    let (h, log) = open(&mut w, FileMode::Write, 300, 9);
    let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();

    w.file_write(h, &data).unwrap();
    assert_eq!(w.file_write(h, b"x"), Err(Error::Busy));

    let mut received = Vec::new();
    for block in 1..=3u64 {
        let cmd = take_one(&mut w);
        assert_eq!(cmd.cmd_id, CMD_ID_FSTSFR);
        let e = cmd.elems();
        assert_eq!(e[0].as_u64(), Some(9));
        assert_eq!(e[1].as_u64(), Some(block));
        received.extend_from_slice(e[2].as_bytes().unwrap());

        let remaining = 300 - received.len() as u64;
        let nc = w.transport_mut();
        nc.rsp(&cmd, CMD_ID_FSTSFR, &[Param::Uint(9), Param::Uint(block), Param::Uint(remaining)]);
        nc.ok(&cmd);
        pump(&mut w);
    }

    assert_eq!(received, data);
    assert_eq!(*log.borrow(), [Seen::WriteComplete]);
    assert_eq!(w.file_size(h), Ok(300));

    w.file_close(h).unwrap();
    assert_eq!(log.borrow().last(), Some(&Seen::Close));
    assert!(w.transport_mut().take_sent().is_empty());
}

#[test]
fn read_session_probes_then_pulls() {
    let mut w = driver();
    let (h, log) = open(&mut w, FileMode::Read, 0, 5);

    w.file_read(h, 100).unwrap();
    let probe = take_one(&mut w);
    assert_eq!(probe.cmd_id, CMD_ID_FSTSFR);
    assert_eq!(probe.num_params, 1);
    let nc = w.transport_mut();
    nc.rsp(&probe, CMD_ID_FSTSFR, &[Param::Uint(5), Param::Uint(0), Param::Uint(150)]);
    nc.ok(&probe);
    pump(&mut w);
    assert_eq!(w.file_size(h), Ok(150));

    let content: Vec<u8> = (0..150u32).map(|i| (i * 7) as u8).collect();

    let recv = take_one(&mut w);
    assert_eq!(recv.cmd_id, CMD_ID_FSRECV);
    let e = recv.elems();
    assert_eq!((e[1].as_u64(), e[2].as_u64()), (Some(1), Some(100)));
    let nc = w.transport_mut();
    nc.rsp(&recv, CMD_ID_FSTSFR, &[
        Param::Uint(5),
        Param::Uint(1),
        Param::Uint(50),
        Param::Bytes(&content[..100]),
    ]);
    nc.ok(&recv);
    pump(&mut w);
    assert_eq!(*log.borrow(), [Seen::Read(content[..100].to_vec())]);

    w.file_read(h, 100).unwrap();
    let recv = take_one(&mut w);
    let e = recv.elems();
    assert_eq!((e[1].as_u64(), e[2].as_u64()), (Some(2), Some(50)));
    let nc = w.transport_mut();
    nc.rsp(&recv, CMD_ID_FSTSFR, &[
        Param::Uint(5),
        Param::Uint(2),
        Param::Uint(0),
        Param::Bytes(&content[100..]),
    ]);
    nc.ok(&recv);
    pump(&mut w);
    assert_eq!(log.borrow().last(), Some(&Seen::Read(content[100..].to_vec())));

    assert_eq!(w.file_read(h, 10), Err(Error::RequestError));
    w.file_close(h).unwrap();
    assert_eq!(log.borrow().last(), Some(&Seen::Close));
}

#[test]
fn rejected_open_reports_error_and_frees_slot() {
    let mut w = driver();
    let (log, cb) = recorder();
    let h = w.file_open(b"missing", FileType::User, FileMode::Read, 0, cb).unwrap();

    let cmd = take_one(&mut w);
    w.transport_mut().status(&cmd, 2);
    pump(&mut w);

    assert_eq!(*log.borrow(), [Seen::Error]);
    assert_eq!(w.file_size(h), Err(Error::NotOpen));
}

#[test]
fn find_lists_entries_then_done() {
    let mut w = driver();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    w.file_find(
        FileType::Certs,
        Box::new(move |ev| {
            sink.borrow_mut().push(match ev {
                FindEvent::Entry { name, .. } => String::from_utf8_lossy(name).into_owned(),
                FindEvent::Done { ok } => format!("done:{ok}"),
            });
        }),
    )
    .unwrap();

    let cmd = take_one(&mut w);
    assert_eq!(cmd.elems()[0].as_u64(), Some(u64::from(FS_OP_LIST)));
    assert_eq!(w.file_find(FileType::User, Box::new(|_| {})), Err(Error::RetryRequest));

    let nc = w.transport_mut();
    for name in [&b"a.pem"[..], b"b.pem"] {
        nc.rsp(&cmd, CMD_ID_FS, &[
            Param::Uint(u64::from(FS_OP_LIST)),
            Param::Uint(FileType::Certs as u64),
            Param::Str(name),
        ]);
    }
    nc.ok(&cmd);
    pump(&mut w);

    assert_eq!(*seen.borrow(), ["a.pem", "b.pem", "done:true"]);
}

#[test]
fn delete_reports_rejection() {
    let mut w = driver();
    let result = Rc::new(RefCell::new(None));
    let sink = result.clone();
    w.file_delete(b"old.cfg", FileType::Cfg, Box::new(move |ok| *sink.borrow_mut() = Some(ok)))
        .unwrap();

    let cmd = take_one(&mut w);
    let e = cmd.elems();
    assert_eq!(e[0].as_u64(), Some(u64::from(FS_OP_DEL)));
    assert_eq!(e[2].as_bytes(), Some(&b"old.cfg"[..]));

    w.transport_mut().status(&cmd, 1);
    pump(&mut w);
    assert_eq!(*result.borrow(), Some(false));
}

#[test]
fn responses_split_across_reads_still_dispatch() {
    let mut w = driver();
    w.transport_mut().chunk = Some(3);
    let (h, log) = open(&mut w, FileMode::Write, 10, 2);

    w.file_write(h, b"0123456789").unwrap();
    let cmd = take_one(&mut w);
    let nc = w.transport_mut();
    nc.rsp(&cmd, CMD_ID_FSTSFR, &[Param::Uint(2), Param::Uint(1), Param::Uint(0)]);
    nc.ok(&cmd);
    pump(&mut w);

    assert_eq!(*log.borrow(), [Seen::WriteComplete]);
}

#[test]
fn transport_failure_latches_bus_error() {
    let mut w = driver();
    w.transport_mut().fail_writes = true;
    let (_, cb) = recorder();
    assert!(w.file_open(b"a", FileType::User, FileMode::Write, 4, cb).is_none());
    assert_eq!(w.bus_state(), BusState::Error);

    w.transport_mut().fail_writes = false;
    let (_, cb) = recorder();
    assert!(w.file_open(b"a", FileType::User, FileMode::Write, 4, cb).is_none());

    w.set_bus_state(BusState::Idle);
    let (_, cb) = recorder();
    assert!(w.file_open(b"a", FileType::User, FileMode::Write, 4, cb).is_some());
}

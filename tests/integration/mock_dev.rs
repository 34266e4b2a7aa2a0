//! Scripted co-processor for integration tests.
//!
//! Captures every byte the driver writes and parses it back into the
//! commands it carried; tests answer those commands by queueing status,
//! response and event frames that the driver reads on its next pump.

use std::collections::VecDeque;

use wnc_driver::nc::codec::{CMD_HDR_LEN, FRAME_HDR_LEN, MSG_AEC, MSG_CMD_REQ, MSG_CMD_STATUS, MSG_RSP, encode_frame};
use wnc_driver::nc::elem::{ElemList, Param, unpack_elements};
use wnc_driver::nc::{STATUS_OK, Transport};
use wnc_driver::wdrv::Wdrv;

// ── Captured commands ─────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SentCmd {
    pub cmd_id: u16,
    pub seq: u16,
    pub num_params: u8,
    pub params: Vec<u8>,
}

impl SentCmd {
    pub fn elems(&self) -> ElemList<'_> {
        unpack_elements(usize::from(self.num_params), &self.params).expect("driver sent malformed params")
    }
}

fn le16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

// ── MockNc ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNc {
    outbound: Vec<u8>,
    inbound: VecDeque<u8>,
    /// Largest read served at once; `None` serves everything queued.
    pub chunk: Option<usize>,
    pub fail_writes: bool,
    pub flushes: usize,
}

#[allow(dead_code)]
impl MockNc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and decode every command burst written since the last call.
    pub fn take_sent(&mut self) -> Vec<SentCmd> {
        let raw = std::mem::take(&mut self.outbound);
        let mut cmds = Vec::new();
        let mut pos = 0;

        while pos < raw.len() {
            let len = usize::from(le16(&raw, pos));
            assert_eq!(raw[pos + 2], MSG_CMD_REQ, "driver sent a non-command frame");
            let body = &raw[pos + FRAME_HDR_LEN..pos + 2 + len];
            pos += 2 + len;

            let mut at = 1;
            for _ in 0..body[0] {
                let params_len = usize::from(le16(body, at + 5));
                let params = body[at + CMD_HDR_LEN..at + CMD_HDR_LEN + params_len].to_vec();
                cmds.push(SentCmd {
                    cmd_id: le16(body, at),
                    seq: le16(body, at + 2),
                    num_params: body[at + 4],
                    params,
                });
                at += CMD_HDR_LEN + params_len;
            }
            assert_eq!(at, body.len(), "trailing bytes in command burst");
        }
        cmds
    }

    fn queue(&mut self, msg_type: u8, body: &[u8]) {
        let mut frame = vec![0; FRAME_HDR_LEN + body.len()];
        let n = encode_frame(msg_type, body, &mut frame).expect("frame too large");
        self.inbound.extend(&frame[..n]);
    }

    /// Queue raw bytes, bypassing framing.
    pub fn queue_raw(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    pub fn status(&mut self, cmd: &SentCmd, status: u16) {
        let mut body = Vec::with_capacity(6);
        body.extend_from_slice(&cmd.seq.to_le_bytes());
        body.extend_from_slice(&cmd.cmd_id.to_le_bytes());
        body.extend_from_slice(&status.to_le_bytes());
        self.queue(MSG_CMD_STATUS, &body);
    }

    pub fn ok(&mut self, cmd: &SentCmd) {
        self.status(cmd, STATUS_OK);
    }

    pub fn rsp(&mut self, cmd: &SentCmd, rsp_id: u16, params: &[Param<'_>]) {
        let mut body = Vec::new();
        body.extend_from_slice(&cmd.seq.to_le_bytes());
        body.extend_from_slice(&rsp_id.to_le_bytes());
        body.push(params.len() as u8);
        encode_params(params, &mut body);
        self.queue(MSG_RSP, &body);
    }

    pub fn aec(&mut self, aec_id: u16, params: &[Param<'_>]) {
        let mut body = Vec::new();
        body.extend_from_slice(&aec_id.to_le_bytes());
        body.push(params.len() as u8);
        encode_params(params, &mut body);
        self.queue(MSG_AEC, &body);
    }
}

fn encode_params(params: &[Param<'_>], out: &mut Vec<u8>) {
    for p in params {
        let start = out.len();
        out.resize(start + p.encoded_len(), 0);
        p.encode(&mut out[start..]).expect("param encode");
    }
}

impl Transport for MockNc {
    type Error = &'static str;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let limit = self.chunk.unwrap_or(usize::MAX);
        let n = buf.len().min(self.inbound.len()).min(limit);
        for (dst, src) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        if self.fail_writes {
            return Err("link down");
        }
        self.outbound.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.flushes += 1;
        Ok(())
    }

    fn data_ready(&self) -> bool {
        !self.inbound.is_empty()
    }
}

// ── Harness helpers ───────────────────────────────────────────

#[allow(dead_code)]
pub fn driver() -> Wdrv<MockNc> {
    Wdrv::new(MockNc::new(), &wnc_driver::config::DriverConfig::default()).expect("default config is valid")
}

/// Run the event loop until every queued frame is consumed.  A partial
/// frame ends an engine pass, so keep going while bytes remain queued.
#[allow(dead_code)]
pub fn pump(w: &mut Wdrv<MockNc>) {
    loop {
        w.handle_event(|| false);
        if !w.transport_mut().data_ready() {
            break;
        }
    }
}

#[allow(dead_code)]
pub fn take_one(w: &mut Wdrv<MockNc>) -> SentCmd {
    let mut sent = w.transport_mut().take_sent();
    assert_eq!(sent.len(), 1, "expected exactly one command, got {:?}", sent);
    sent.remove(0)
}

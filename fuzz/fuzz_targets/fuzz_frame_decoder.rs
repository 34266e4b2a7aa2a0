//! Fuzz target: receive path
//!
//! Drives arbitrary byte sequences through the streaming frame decoder
//! and the full dispatcher, asserting that neither panics and that the
//! decoder never yields a body larger than its buffer.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use wnc_driver::config::DriverConfig;
use wnc_driver::nc::Transport;
use wnc_driver::nc::codec::{Decoded, FrameDecoder};
use wnc_driver::wdrv::Wdrv;

struct Feed<'a>(&'a [u8]);

impl Transport for Feed<'_> {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let n = buf.len().min(self.0.len());
        buf[..n].copy_from_slice(&self.0[..n]);
        self.0 = &self.0[n..];
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn data_ready(&self) -> bool {
        !self.0.is_empty()
    }
}

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new(256);
    let mut rest = data;
    loop {
        let n = decoder.push(rest);
        rest = &rest[n..];
        match decoder.decode() {
            Decoded::Frame { body, .. } => {
                assert!(body.len() < decoder.capacity(), "body exceeds buffer");
                decoder.consume();
            }
            Decoded::Discarded(_) => {}
            Decoded::Incomplete if rest.is_empty() || n == 0 => break,
            Decoded::Incomplete => {}
        }
    }

    // Same bytes through the whole engine with every service attached.
    if let Ok(mut w) = Wdrv::new(Feed(data), &DriverConfig::default()) {
        let _ = w.assoc_station();
        while w.handle_event(|| false) {}
    }
});

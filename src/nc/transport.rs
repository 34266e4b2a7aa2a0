//! Transport abstraction, the byte pipe to the co-processor.
//!
//! The engine is generic over `Transport`; it only needs ordered,
//! reliable delivery.  Concrete implementations:
//! - [`SpiTransport`] over an `embedded-hal` SPI device plus IRQ line
//! - [`NullTransport`] when nothing is attached
//! - scripted mocks in the integration tests

use embedded_hal::digital::InputPin;
use embedded_hal::spi::SpiDevice;

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.  Called after the last fragment of a
    /// burst.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if the co-processor has data for the host.
    fn data_ready(&self) -> bool;
}

/// A null transport that discards all writes and never reads.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn data_ready(&self) -> bool {
        false
    }
}

// ── SPI link ──────────────────────────────────────────────────

/// Errors from the SPI link.
#[derive(Debug)]
pub enum SpiLinkError<S, P> {
    Spi(S),
    Irq(P),
}

/// Largest single SPI read transaction.
const SPI_READ_CHUNK: usize = 64;

/// Transport over an SPI device with an active-low "data ready" line.
///
/// While the line is asserted the co-processor answers a 2-byte read with
/// the number of bytes it has queued (LE `u16`); those bytes are then
/// clocked out in chunks, possibly across several `read` calls.
pub struct SpiTransport<S, P> {
    spi: S,
    irq: P,
    /// Bytes announced by the co-processor but not yet clocked out.
    rx_pending: usize,
    /// Cached line level from the last poll; `data_ready` takes `&self`.
    irq_asserted: bool,
}

impl<S: SpiDevice, P: InputPin> SpiTransport<S, P> {
    pub fn new(spi: S, irq: P) -> Self {
        Self {
            spi,
            irq,
            rx_pending: 0,
            irq_asserted: false,
        }
    }

    /// Sample the IRQ line.  Call from the pump loop before `handle_event`.
    pub fn poll_irq(&mut self) -> Result<bool, SpiLinkError<S::Error, P::Error>> {
        self.irq_asserted = self.irq.is_low().map_err(SpiLinkError::Irq)?;
        Ok(self.irq_asserted)
    }

    pub fn release(self) -> (S, P) {
        (self.spi, self.irq)
    }
}

impl<S: SpiDevice, P: InputPin> Transport for SpiTransport<S, P> {
    type Error = SpiLinkError<S::Error, P::Error>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.rx_pending == 0 {
            if !self.poll_irq()? {
                return Ok(0);
            }
            let mut count = [0u8; 2];
            self.spi.transfer_in_place(&mut count).map_err(SpiLinkError::Spi)?;
            self.rx_pending = usize::from(u16::from_le_bytes(count));
            if self.rx_pending == 0 {
                return Ok(0);
            }
        }

        let n = buf.len().min(self.rx_pending).min(SPI_READ_CHUNK);
        let chunk = &mut buf[..n];
        chunk.fill(0);
        self.spi.transfer_in_place(chunk).map_err(SpiLinkError::Spi)?;
        self.rx_pending -= n;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        self.spi.write(data).map_err(SpiLinkError::Spi)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn data_ready(&self) -> bool {
        self.irq_asserted || self.rx_pending > 0
    }
}

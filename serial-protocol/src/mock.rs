//! In-memory link and clock for exercising the protocol without hardware.
use core::convert::Infallible;
use heapless::{Deque, Vec};

use crate::{Clock, Instant};

/// Scripted serial link: bytes fed by the test are read by the device, bytes written by the
/// device are collected.
#[derive(Default)]
pub struct MockLink {
    input: Deque<u8, 4096>,
    output: Vec<u8, 256>,
    hung_up: bool,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if sent by the host. Bytes beyond the queue capacity are dropped.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.input.push_back(byte).ok();
        }
    }

    /// Number of bytes not yet read by the device.
    pub fn pending(&self) -> usize {
        self.input.len()
    }

    /// Bytes written by the device so far.
    pub fn written(&self) -> &[u8] {
        &self.output
    }

    pub fn clear_written(&mut self) {
        self.output.clear();
    }

    /// Drop the host side. Once the queued bytes are read, the link stays ready and every
    /// read returns end of file.
    pub fn hang_up(&mut self) {
        self.hung_up = true;
    }
}

impl embedded_io::ErrorType for MockLink {
    type Error = Infallible;
}

impl embedded_io::Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.input.pop_front() {
                Some(byte) => *slot = byte,
                None => break,
            }
            count += 1;
        }
        Ok(count)
    }
}

impl embedded_io::ReadReady for MockLink {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.hung_up || !self.input.is_empty())
    }
}

impl embedded_io::Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            self.output.push(byte).ok();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Clock advancing by one millisecond on every query, so bounded waits always terminate.
#[derive(Default)]
pub struct StepClock {
    ticks: u32,
}

impl StepClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, ms: u32) {
        self.ticks = self.ticks.wrapping_add(ms);
    }
}

impl Clock for StepClock {
    fn now(&mut self) -> Instant {
        let now = Instant::from_ticks(self.ticks);
        self.ticks = self.ticks.wrapping_add(1);
        now
    }
}

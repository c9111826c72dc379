//! Acquisition loop
//!
//! # Design
//! One [Scanner::tick] is one command poll, one column acquisition and one render handoff.
//! State shared between these phases (configuration, cursor, normalization) is only touched
//! from here, in a fixed order:
//! 1. Apply a staged configuration.
//! 2. Check port presence. A port connecting or disconnecting restarts the image.
//! 3. Poll the data port for one command.
//! 4. Restart the image if RESET was received.
//! 5. Demodulate streamed samples or a synthetic phantom into a column and render it.
use echo_dsp::{generator, Column, Demodulator, EchoGenerator, TimeSpan};
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};
use serial_protocol::{
    Clock, Instant, LinkMonitor, Outcome, Platform, Session, SETUP_WORDS,
};

use crate::{
    hardware::{Display, Inputs},
    Config, ConfigStore, Error, Image, Placement, COLUMNS, ROWS,
    SIGNAL_CAPACITY,
};

/// Seed of the phantom amplitude sequence.
const PHANTOM_SEED: u64 = 0x5eed_0ec0;

/// Everything the protocol session needs from the device.
pub struct DeviceLink<I, K, L> {
    interface: I,
    clock: K,
    led: L,
    config: ConfigStore,
    reset_requested: bool,
}

impl<I, K, L> DeviceLink<I, K, L> {
    pub fn new(interface: I, clock: K, led: L) -> Self {
        Self {
            interface,
            clock,
            led,
            config: ConfigStore::default(),
            reset_requested: false,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    fn take_reset(&mut self) -> bool {
        core::mem::take(&mut self.reset_requested)
    }
}

impl<I, K, L> Platform for DeviceLink<I, K, L>
where
    I: Read + ReadReady + Write,
    K: Clock,
    L: OutputPin,
{
    type Interface = I;

    fn interface_mut(&mut self) -> &mut I {
        &mut self.interface
    }

    fn now(&mut self) -> Instant {
        self.clock.now()
    }

    fn stream_len(&self) -> usize {
        self.config.active().local_samples()
    }

    fn stage(&mut self, words: [u16; SETUP_WORDS]) {
        self.config.stage(Config::from_words(words));
    }

    fn reset(&mut self) {
        self.reset_requested = true;
    }

    fn activity(&mut self, active: bool) {
        let result = if active {
            self.led.set_high()
        } else {
            self.led.set_low()
        };
        if let Err(e) = result {
            log::warn!("Failed to drive activity LED: {e:?}");
        }
    }
}

/// Where the samples of a column came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// A STREAM payload received during this tick.
    Stream,
    /// The samples of an earlier STREAM, after a STREAM without payload.
    Stale,
    /// The synthetic phantom.
    Phantom,
}

/// Summary of one acquired column.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tick {
    pub source: Source,
    pub placement: Placement,
    pub command: Option<Outcome>,
}

pub struct Scanner<I, K, L>
where
    I: Read + ReadReady + Write,
    K: Clock,
    L: OutputPin,
{
    session: Session<DeviceLink<I, K, L>, SIGNAL_CAPACITY>,
    monitor: LinkMonitor,
    generator: EchoGenerator<{ generator::RESOLUTION }>,
    demodulator: Demodulator,
    image: Image<ROWS, COLUMNS>,
}

impl<I, K, L> Scanner<I, K, L>
where
    I: Read + ReadReady + Write,
    K: Clock,
    L: OutputPin,
{
    /// Construct the scanner.
    ///
    /// # Args
    /// * `interface` - The data port (S2) carrying the command protocol.
    /// * `clock` - Millisecond time source.
    /// * `led` - Activity indicator, high while a payload is awaited.
    pub fn new(interface: I, clock: K, led: L) -> Result<Self, Error> {
        Ok(Self {
            session: Session::new(DeviceLink::new(interface, clock, led)),
            monitor: LinkMonitor::new(),
            generator: EchoGenerator::phantom(PHANTOM_SEED)?,
            demodulator: Demodulator::new(),
            image: Image::new(),
        })
    }

    pub fn session(&self) -> &Session<DeviceLink<I, K, L>, SIGNAL_CAPACITY> {
        &self.session
    }

    pub fn session_mut(
        &mut self,
    ) -> &mut Session<DeviceLink<I, K, L>, SIGNAL_CAPACITY> {
        &mut self.session
    }

    pub fn config(&self) -> &Config {
        self.session.platform().config().active()
    }

    pub fn image(&self) -> &Image<ROWS, COLUMNS> {
        &self.image
    }

    pub fn links(&self) -> &LinkMonitor {
        &self.monitor
    }

    /// Current normalization denominator.
    pub fn envelope_max(&self) -> f32 {
        self.demodulator.envelope_max()
    }

    /// Run one acquisition step.
    ///
    /// # Returns
    /// The acquired column, or `None` while paused or if no column could be produced.
    pub fn tick(
        &mut self,
        display: &mut impl Display,
        inputs: &mut impl Inputs,
    ) -> Option<Tick> {
        if inputs.paused() {
            return None;
        }

        if let Some(config) = self.session.platform_mut().config_mut().apply() {
            log::info!("Applied configuration {config:?}");
            display.show_config(&config);
        }

        self.check_links(display, inputs);

        let command = if self.monitor.data() {
            self.session.poll().unwrap_or_else(|e| {
                log::warn!("Data port error: {e:?}");
                None
            })
        } else {
            None
        };

        if self.session.platform_mut().take_reset() {
            self.restart(display);
        }

        let start = self.session.platform_mut().now();
        let (source, column) = self.acquire(command)?;
        let placement = self.image.append(column);
        display.render_column(placement.index, &column);

        let end = self.session.platform_mut().now();
        if let Some(elapsed) = end.checked_duration_since(start) {
            log::trace!(
                "Column {} from {source:?} in {} ms",
                placement.index,
                elapsed.ticks()
            );
        }

        Some(Tick {
            source,
            placement,
            command,
        })
    }

    /// Acquire a complete image, one tick per column.
    ///
    /// # Returns
    /// The number of columns acquired.
    pub fn acquire_frame(
        &mut self,
        display: &mut impl Display,
        inputs: &mut impl Inputs,
    ) -> usize {
        let mut count = 0;
        for _ in 0..COLUMNS {
            match self.tick(display, inputs) {
                Some(tick) => {
                    count += 1;
                    if tick.placement.wrapped {
                        break;
                    }
                }
                None => break,
            }
        }
        count
    }

    fn check_links(
        &mut self,
        display: &mut impl Display,
        inputs: &mut impl Inputs,
    ) {
        let now = self.session.platform_mut().now();
        let transitions =
            self.monitor
                .check(now, inputs.programming_link(), inputs.data_link());

        for transition in &transitions {
            display.link_status(transition.endpoint, transition.connected);
        }
        if !transitions.is_empty() {
            self.restart(display);
        }
    }

    /// Start a new image with a fresh brightness calibration.
    fn restart(&mut self, display: &mut impl Display) {
        self.image.clear();
        self.demodulator.reset();
        display.clear_image();
    }

    fn acquire(
        &mut self,
        command: Option<Outcome>,
    ) -> Option<(Source, Column<ROWS>)> {
        let source = match command {
            Some(Outcome::Streamed) => Source::Stream,
            Some(Outcome::StreamStale)
                if !self.session.signal().is_empty() =>
            {
                Source::Stale
            }
            _ => Source::Phantom,
        };

        if source != Source::Phantom {
            match self.demodulate_stream() {
                Ok(column) => return Some((source, column)),
                Err(e) => {
                    log::warn!("Falling back to phantom: {e}");
                }
            }
        }

        match self.demodulate_phantom() {
            Ok(column) => Some((Source::Phantom, column)),
            Err(e) => {
                log::warn!("Phantom acquisition failed: {e}");
                None
            }
        }
    }

    fn demodulate_stream(&mut self) -> Result<Column<ROWS>, Error> {
        let gain = self.config().gain;
        let window = self.config().acquisition_time();

        let mut signal = self.session.signal().clone();
        let timespan =
            TimeSpan::<SIGNAL_CAPACITY>::new(0.0, window, signal.len())?;
        Ok(self.demodulator.demodulate(&mut signal, &timespan, gain)?)
    }

    fn demodulate_phantom(&mut self) -> Result<Column<ROWS>, Error> {
        let gain = self.config().gain;
        let mut signal = self.generator.generate_composite(&generator::PHANTOM);
        Ok(self.demodulator.demodulate(
            &mut signal,
            self.generator.timespan(),
            gain,
        )?)
    }
}

use embedded_io::{Read, ReadReady, Write};
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::{
    decode_sample, decode_setup, Instant, Opcode, PAYLOAD_TIMEOUT,
    SAMPLE_BYTES, SETUP_BYTES, SETUP_WORDS,
};

/// Device-side services required by a [Session].
pub trait Platform {
    /// The data link, for example a USB CDC-ACM serial port.
    type Interface: Read + ReadReady + Write;

    /// Return a mutable reference to the `Interface`.
    fn interface_mut(&mut self) -> &mut Self::Interface;

    /// Current time.
    fn now(&mut self) -> Instant;

    /// Number of samples expected in a STREAM payload under the active configuration.
    fn stream_len(&self) -> usize;

    /// Stage configuration words received by SETUP. They must not take effect before the
    /// current column is complete.
    fn stage(&mut self, words: [u16; SETUP_WORDS]);

    /// Rewind acquisition to the first column and request the image to be cleared.
    fn reset(&mut self);

    /// Drive the activity indicator while a payload is awaited.
    fn activity(&mut self, _active: bool) {}
}

/// Device protocol state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    /// No configuration received yet. Streams are refused.
    NotSetup,
    /// Configured and accepting streams.
    Standby,
    /// Inside a critical section. Every command is refused.
    Busy,
}

/// Why a command was refused with NACK.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    Busy,
    NotSetup,
    Unknown,
}

/// Result of processing one command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Handshake,
    /// A configuration was staged.
    Configured,
    /// The SETUP payload did not arrive completely in time.
    SetupTimeout { received: usize },
    /// A complete STREAM payload is in the signal buffer.
    Streamed,
    /// No STREAM payload arrived. The signal buffer still holds the previous samples.
    StreamStale,
    /// The STREAM payload stopped early. The signal buffer holds the samples received.
    StreamIncomplete { received: usize },
    Reset,
    Rejected { opcode: u8, reason: Rejection },
}

/// Protocol state machine for the data link.
///
/// `N` is the capacity of the signal buffer. Samples streamed beyond it are read from the
/// link and dropped.
pub struct Session<P: Platform, const N: usize> {
    platform: P,
    state: State,
    resume: State,
    signal: Vec<f32, N>,
}

impl<P: Platform, const N: usize> Session<P, N> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            state: State::NotSetup,
            resume: State::NotSetup,
            signal: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Samples of the most recent STREAM.
    pub fn signal(&self) -> &Vec<f32, N> {
        &self.signal
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Refuse all commands until [Session::end_critical].
    pub fn begin_critical(&mut self) {
        if self.state != State::Busy {
            self.resume = self.state;
            self.state = State::Busy;
        }
    }

    /// Return to the state held before [Session::begin_critical].
    pub fn end_critical(&mut self) {
        if self.state == State::Busy {
            self.state = self.resume;
        }
    }

    /// Process at most one pending command.
    ///
    /// # Note
    /// SETUP and STREAM block until their payload is received or [PAYLOAD_TIMEOUT] has
    /// elapsed since the opcode was read.
    ///
    /// # Returns
    /// `None` if no opcode was available.
    pub fn poll(
        &mut self,
    ) -> Result<
        Option<Outcome>,
        <P::Interface as embedded_io::ErrorType>::Error,
    > {
        if !self.platform.interface_mut().read_ready()? {
            return Ok(None);
        }
        let mut opcode = [0u8];
        if self.platform.interface_mut().read(&mut opcode)? == 0 {
            return Ok(None);
        }
        let [opcode] = opcode;
        let start = self.platform.now();

        if self.state == State::Busy {
            return self.reject(opcode, Rejection::Busy).map(Some);
        }

        let outcome = match Opcode::try_from(opcode) {
            Ok(Opcode::Handshake) => {
                self.reply(Opcode::Ack)?;
                Outcome::Handshake
            }
            Ok(Opcode::Setup) => self.setup(start)?,
            Ok(Opcode::Stream) => {
                if self.state != State::Standby {
                    return self.reject(opcode, Rejection::NotSetup).map(Some);
                }
                self.stream(start)?
            }
            Ok(Opcode::Reset) => {
                self.platform.reset();
                self.reply(Opcode::Ack)?;
                Outcome::Reset
            }
            _ => return self.reject(opcode, Rejection::Unknown).map(Some),
        };

        log::debug!("Command {opcode}: {outcome:?}");
        Ok(Some(outcome))
    }

    fn reject(
        &mut self,
        opcode: u8,
        reason: Rejection,
    ) -> Result<Outcome, <P::Interface as embedded_io::ErrorType>::Error> {
        log::warn!("Rejecting command {opcode}: {reason:?}");
        self.reply(Opcode::Nack)?;
        Ok(Outcome::Rejected { opcode, reason })
    }

    fn setup(
        &mut self,
        start: Instant,
    ) -> Result<Outcome, <P::Interface as embedded_io::ErrorType>::Error> {
        self.reply(Opcode::Ack)?;

        let mut payload = [0; SETUP_BYTES];
        self.platform.activity(true);
        let received = self.receive(&mut payload, start);
        self.platform.activity(false);
        let received = received?;

        if received < SETUP_BYTES {
            log::warn!("SETUP payload timed out after {received} bytes");
            self.reply(Opcode::Nack)?;
            return Ok(Outcome::SetupTimeout { received });
        }

        let words = decode_setup(&payload);
        log::info!("Staging configuration {words:?}");
        self.platform.stage(words);
        self.state = State::Standby;
        self.reply(Opcode::Ack)?;
        Ok(Outcome::Configured)
    }

    fn stream(
        &mut self,
        start: Instant,
    ) -> Result<Outcome, <P::Interface as embedded_io::ErrorType>::Error> {
        self.reply(Opcode::Ack)?;

        self.platform.activity(true);
        let outcome = self.receive_stream(start);
        self.platform.activity(false);

        match outcome? {
            outcome @ Outcome::Streamed => {
                self.reply(Opcode::Ack)?;
                Ok(outcome)
            }
            outcome @ Outcome::StreamIncomplete { received } => {
                log::warn!("STREAM payload timed out after {received} samples");
                self.reply(Opcode::Nack)?;
                Ok(outcome)
            }
            // The host gets no reply for a payload that never started.
            outcome => {
                log::warn!("STREAM payload missing, keeping previous samples");
                Ok(outcome)
            }
        }
    }

    fn receive_stream(
        &mut self,
        start: Instant,
    ) -> Result<Outcome, <P::Interface as embedded_io::ErrorType>::Error> {
        // Keep the previous samples until the new payload actually starts.
        loop {
            if self.platform.interface_mut().read_ready()? {
                break;
            }
            if self.expired(start) {
                return Ok(Outcome::StreamStale);
            }
        }

        let expected = self.platform.stream_len();
        if expected > N {
            log::debug!("Truncating STREAM of {expected} samples to {N}");
        }

        self.signal.clear();
        let mut sample = [0; SAMPLE_BYTES];
        for received in 0..expected {
            if self.receive(&mut sample, start)? < SAMPLE_BYTES {
                return Ok(Outcome::StreamIncomplete { received });
            }
            // Samples beyond capacity are dropped.
            self.signal.push(decode_sample(sample)).ok();
        }

        Ok(Outcome::Streamed)
    }

    /// Fill `buffer` from the link until it is full or the deadline passes.
    ///
    /// # Returns
    /// The number of bytes received.
    fn receive(
        &mut self,
        buffer: &mut [u8],
        start: Instant,
    ) -> Result<usize, <P::Interface as embedded_io::ErrorType>::Error> {
        let mut filled = 0;
        while filled < buffer.len() {
            let interface = self.platform.interface_mut();
            if interface.read_ready()? {
                let count = interface.read(&mut buffer[filled..])?;
                if count > 0 {
                    filled += count;
                    continue;
                }
            }
            // Nothing ready, or end of file after the port hung up
            if self.expired(start) {
                break;
            }
        }
        Ok(filled)
    }

    fn expired(&mut self, start: Instant) -> bool {
        self.platform
            .now()
            .checked_duration_since(start)
            .map_or(true, |elapsed| elapsed > PAYLOAD_TIMEOUT)
    }

    fn reply(
        &mut self,
        opcode: Opcode,
    ) -> Result<(), <P::Interface as embedded_io::ErrorType>::Error> {
        let interface = self.platform.interface_mut();
        interface.write_all(&[u8::from(opcode)])?;
        interface.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encode_sample, encode_setup,
        mock::{MockLink, StepClock},
        Clock,
    };

    const ACK: u8 = 1;
    const NACK: u8 = 2;
    const WORDS: [u16; SETUP_WORDS] = [10, 1, 100, 1000, 0, 3, 10, 1550, 1, 40];

    #[derive(Default)]
    struct TestPlatform {
        link: MockLink,
        clock: StepClock,
        staged: Option<[u16; SETUP_WORDS]>,
        resets: usize,
        activity: Vec<bool, 8>,
        stream_len: usize,
    }

    impl Platform for TestPlatform {
        type Interface = MockLink;

        fn interface_mut(&mut self) -> &mut MockLink {
            &mut self.link
        }

        fn now(&mut self) -> Instant {
            self.clock.now()
        }

        fn stream_len(&self) -> usize {
            self.stream_len
        }

        fn stage(&mut self, words: [u16; SETUP_WORDS]) {
            self.staged = Some(words);
        }

        fn reset(&mut self) {
            self.resets += 1;
        }

        fn activity(&mut self, active: bool) {
            self.activity.push(active).ok();
        }
    }

    fn session<const N: usize>() -> Session<TestPlatform, N> {
        Session::new(TestPlatform {
            stream_len: 3,
            ..Default::default()
        })
    }

    fn feed<const N: usize>(session: &mut Session<TestPlatform, N>, bytes: &[u8]) {
        session.platform_mut().link.feed(bytes);
    }

    fn written<const N: usize>(session: &Session<TestPlatform, N>) -> &[u8] {
        session.platform().link.written()
    }

    fn configure<const N: usize>(session: &mut Session<TestPlatform, N>) {
        feed(session, &[Opcode::Setup.into()]);
        feed(session, &encode_setup(&WORDS));
        assert_eq!(session.poll(), Ok(Some(Outcome::Configured)));
        session.platform_mut().link.clear_written();
        session.platform_mut().activity.clear();
    }

    fn stream<const N: usize>(session: &mut Session<TestPlatform, N>, samples: &[f32]) {
        feed(session, &[Opcode::Stream.into()]);
        for &sample in samples {
            feed(session, &encode_sample(sample));
        }
    }

    #[test]
    fn idle() {
        let mut session = session::<8>();
        assert_eq!(session.poll(), Ok(None));
        assert!(written(&session).is_empty());
    }

    #[test]
    fn handshake() {
        let mut session = session::<8>();
        feed(&mut session, &[0]);
        assert_eq!(session.poll(), Ok(Some(Outcome::Handshake)));
        assert_eq!(written(&session), &[ACK]);
        assert_eq!(session.state(), State::NotSetup);
    }

    #[test]
    fn stream_before_setup() {
        let mut session = session::<8>();
        feed(&mut session, &[3, 0x64, 0x00]);
        assert_eq!(
            session.poll(),
            Ok(Some(Outcome::Rejected {
                opcode: 3,
                reason: Rejection::NotSetup
            }))
        );
        assert_eq!(written(&session), &[NACK]);
        assert!(session.signal().is_empty());
        assert_eq!(session.platform().link.pending(), 2);
    }

    #[test]
    fn setup() {
        let mut session = session::<8>();
        feed(&mut session, &[5]);
        feed(&mut session, &encode_setup(&WORDS));
        assert_eq!(session.poll(), Ok(Some(Outcome::Configured)));
        assert_eq!(written(&session), &[ACK, ACK]);
        assert_eq!(session.state(), State::Standby);
        assert_eq!(session.platform().staged, Some(WORDS));
        assert_eq!(&session.platform().activity[..], &[true, false]);
    }

    #[test]
    fn setup_silent() {
        let mut session = session::<8>();
        feed(&mut session, &[5]);
        assert_eq!(
            session.poll(),
            Ok(Some(Outcome::SetupTimeout { received: 0 }))
        );
        assert_eq!(written(&session), &[ACK, NACK]);
        assert_eq!(session.state(), State::NotSetup);
        assert_eq!(session.platform().staged, None);
        assert_eq!(&session.platform().activity[..], &[true, false]);
    }

    #[test]
    fn setup_short() {
        let mut session = session::<8>();
        feed(&mut session, &[5]);
        feed(&mut session, &encode_setup(&WORDS)[..7]);
        assert_eq!(
            session.poll(),
            Ok(Some(Outcome::SetupTimeout { received: 7 }))
        );
        assert_eq!(written(&session), &[ACK, NACK]);
        assert_eq!(session.platform().staged, None);
    }

    #[test]
    fn setup_hang_up() {
        let mut session = session::<8>();
        feed(&mut session, &[5]);
        feed(&mut session, &encode_setup(&WORDS)[..4]);
        session.platform_mut().link.hang_up();
        assert_eq!(
            session.poll(),
            Ok(Some(Outcome::SetupTimeout { received: 4 }))
        );
        assert_eq!(written(&session), &[ACK, NACK]);
        assert_eq!(session.state(), State::NotSetup);
        assert_eq!(session.platform().staged, None);

        // End of file is not an opcode.
        assert_eq!(session.poll(), Ok(None));
    }

    #[test]
    fn stream_hang_up() {
        let mut session = session::<8>();
        configure(&mut session);

        stream(&mut session, &[4.0]);
        session.platform_mut().link.hang_up();
        assert_eq!(
            session.poll(),
            Ok(Some(Outcome::StreamIncomplete { received: 1 }))
        );
        assert_eq!(written(&session), &[ACK, NACK]);
        assert_eq!(&session.platform().activity[..], &[true, false]);
    }

    #[test]
    fn stream_samples() {
        let mut session = session::<8>();
        configure(&mut session);

        stream(&mut session, &[1.0, -2.5, 3.27]);
        assert_eq!(session.poll(), Ok(Some(Outcome::Streamed)));
        assert_eq!(written(&session), &[ACK, ACK]);
        assert_eq!(&session.signal()[..], &[1.0, -2.5, 3.27]);
        assert_eq!(&session.platform().activity[..], &[true, false]);
        assert_eq!(session.state(), State::Standby);
    }

    #[test]
    fn stream_stale() {
        let mut session = session::<8>();
        configure(&mut session);
        stream(&mut session, &[1.0, 2.0, 3.0]);
        session.poll().unwrap();
        session.platform_mut().link.clear_written();

        feed(&mut session, &[3]);
        assert_eq!(session.poll(), Ok(Some(Outcome::StreamStale)));
        assert_eq!(written(&session), &[ACK]);
        assert_eq!(&session.signal()[..], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn stream_incomplete() {
        let mut session = session::<8>();
        configure(&mut session);

        stream(&mut session, &[4.0]);
        feed(&mut session, &[0x10]);
        assert_eq!(
            session.poll(),
            Ok(Some(Outcome::StreamIncomplete { received: 1 }))
        );
        assert_eq!(written(&session), &[ACK, NACK]);
        assert_eq!(&session.signal()[..], &[4.0]);
    }

    #[test]
    fn stream_truncated_at_capacity() {
        let mut session = session::<2>();
        configure(&mut session);

        stream(&mut session, &[1.0, 2.0, 3.0]);
        assert_eq!(session.poll(), Ok(Some(Outcome::Streamed)));
        assert_eq!(&session.signal()[..], &[1.0, 2.0]);
        assert_eq!(session.platform().link.pending(), 0);
    }

    #[test]
    fn reset() {
        let mut session = session::<8>();
        feed(&mut session, &[4]);
        assert_eq!(session.poll(), Ok(Some(Outcome::Reset)));
        assert_eq!(written(&session), &[ACK]);
        assert_eq!(session.platform().resets, 1);
    }

    #[test]
    fn unknown() {
        let mut session = session::<8>();
        for opcode in [1, 2, 6, 0xff] {
            feed(&mut session, &[opcode]);
            assert_eq!(
                session.poll(),
                Ok(Some(Outcome::Rejected {
                    opcode,
                    reason: Rejection::Unknown
                }))
            );
        }
        assert_eq!(written(&session), &[NACK; 4]);
        assert_eq!(session.state(), State::NotSetup);
    }

    #[test]
    fn busy() {
        let mut session = session::<8>();
        configure(&mut session);
        session.begin_critical();
        assert_eq!(session.state(), State::Busy);

        feed(&mut session, &[0, 5, 1, 2]);
        for opcode in [0, 5] {
            assert_eq!(
                session.poll(),
                Ok(Some(Outcome::Rejected {
                    opcode,
                    reason: Rejection::Busy
                }))
            );
        }
        assert_eq!(written(&session), &[NACK, NACK]);
        assert_eq!(session.platform().link.pending(), 2);

        session.end_critical();
        assert_eq!(session.state(), State::Standby);
    }
}

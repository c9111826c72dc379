use num_enum::{IntoPrimitive, TryFromPrimitive};
use num_traits::Float;

/// Command and reply opcodes.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum Opcode {
    Handshake = 0,
    Ack = 1,
    Nack = 2,
    Stream = 3,
    Reset = 4,
    Setup = 5,
}

/// Number of configuration words in a SETUP payload.
pub const SETUP_WORDS: usize = 10;

/// Size of a SETUP payload in bytes.
pub const SETUP_BYTES: usize = 2 * SETUP_WORDS;

/// Size of one STREAM sample in bytes.
pub const SAMPLE_BYTES: usize = 2;

/// Fixed-point scale of STREAM samples.
pub const SAMPLE_SCALE: f32 = 100.0;

/// Assemble the little-endian words of a SETUP payload.
pub fn decode_setup(payload: &[u8; SETUP_BYTES]) -> [u16; SETUP_WORDS] {
    core::array::from_fn(|i| {
        u16::from_le_bytes([payload[2 * i], payload[2 * i + 1]])
    })
}

/// Serialize configuration words as sent by the host.
pub fn encode_setup(words: &[u16; SETUP_WORDS]) -> [u8; SETUP_BYTES] {
    let mut payload = [0; SETUP_BYTES];
    for (chunk, word) in payload.chunks_exact_mut(2).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    payload
}

/// Amplitude of a STREAM sample.
pub fn decode_sample(bytes: [u8; SAMPLE_BYTES]) -> f32 {
    i16::from_le_bytes(bytes) as f32 / SAMPLE_SCALE
}

/// Fixed-point STREAM sample of an amplitude, rounded and saturated to `i16`.
pub fn encode_sample(amplitude: f32) -> [u8; SAMPLE_BYTES] {
    ((amplitude * SAMPLE_SCALE).round() as i16).to_le_bytes()
}

//! Acquisition settings
//!
//! # Design
//! The host replaces the whole [Config] with a SETUP command. The new settings are only
//! staged; [ConfigStore::apply] makes them active at the start of a tick so one column is never
//! computed from two different configurations.
use serde::{Deserialize, Serialize};
use serial_protocol::SETUP_WORDS;

/// Acquisition parameters, in SETUP wire order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Probe operating frequency in MHz.
    pub frequency: u8,
    /// Linear image amplification.
    pub image_scale: u8,
    /// Sample rate of the global acquisition.
    pub sample_rate: u16,
    /// Number of samples in the global acquisition.
    pub global_samples: u16,
    /// First sample of the streamed window.
    pub min_time: u16,
    /// End of the streamed window.
    pub max_time: u16,
    /// Receiver gain. Lowers the amplitude ceiling to `255 - gain`.
    pub gain: u8,
    /// Speed of sound in m/s.
    pub speed_of_sound: u16,
    /// Show B-scan depth.
    pub bscan_depth: bool,
    pub select_plane: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frequency: 10,
            image_scale: 1,
            sample_rate: 100,
            global_samples: 1000,
            min_time: 0,
            max_time: 1000,
            gain: 10,
            speed_of_sound: 1550,
            bscan_depth: true,
            select_plane: 40,
        }
    }
}

impl Config {
    /// Decode SETUP words. 8-bit fields keep the low byte of their word.
    pub fn from_words(words: [u16; SETUP_WORDS]) -> Self {
        let [
            frequency,
            image_scale,
            sample_rate,
            global_samples,
            min_time,
            max_time,
            gain,
            speed_of_sound,
            bscan_depth,
            select_plane,
        ] = words;
        Self {
            frequency: frequency as u8,
            image_scale: image_scale as u8,
            sample_rate,
            global_samples,
            min_time,
            max_time,
            gain: gain as u8,
            speed_of_sound,
            bscan_depth: bscan_depth != 0,
            select_plane: select_plane as u8,
        }
    }

    pub fn to_words(&self) -> [u16; SETUP_WORDS] {
        [
            self.frequency as u16,
            self.image_scale as u16,
            self.sample_rate,
            self.global_samples,
            self.min_time,
            self.max_time,
            self.gain as u16,
            self.speed_of_sound,
            self.bscan_depth as u16,
            self.select_plane as u16,
        ]
    }

    /// Number of samples in a STREAM payload.
    pub fn local_samples(&self) -> usize {
        self.max_time.saturating_sub(self.min_time) as usize
    }

    /// Duration of the acquisition window in microseconds.
    pub fn acquisition_time(&self) -> f32 {
        self.global_samples as f32 / self.sample_rate.max(1) as f32
    }
}

/// Active configuration plus at most one staged replacement.
#[derive(Clone, Debug, Default)]
pub struct ConfigStore {
    active: Config,
    staged: Option<Config>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            active: config,
            staged: None,
        }
    }

    pub fn active(&self) -> &Config {
        &self.active
    }

    pub fn staged(&self) -> Option<&Config> {
        self.staged.as_ref()
    }

    /// Schedule `config` to become active at the next [ConfigStore::apply]. A later stage
    /// replaces an earlier one.
    pub fn stage(&mut self, config: Config) {
        self.staged = Some(config);
    }

    /// Activate the staged configuration.
    ///
    /// # Returns
    /// The newly active configuration, if one was staged.
    pub fn apply(&mut self) -> Option<Config> {
        let config = self.staged.take()?;
        self.active = config;
        Some(config)
    }
}

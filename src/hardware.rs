//! Board collaborators
//!
//! The acquisition core does not draw pixels or read pins itself. A board support package
//! implements these traits for its panel driver and front panel.
use serial_protocol::Endpoint;

use crate::Config;

/// Image and sidebar rendering.
pub trait Display {
    /// Draw a grayscale column at image column `index`.
    fn render_column(&mut self, index: usize, column: &[u8]);

    /// Blank the image area.
    fn clear_image(&mut self);

    /// Update the sidebar status mark of a serial port.
    fn link_status(&mut self, endpoint: Endpoint, connected: bool);

    /// Update the sidebar with a newly applied configuration.
    fn show_config(&mut self, _config: &Config) {}
}

/// Front panel and port presence inputs.
pub trait Inputs {
    /// The programming port (S1) is attached.
    fn programming_link(&mut self) -> bool;

    /// The native data port (S2) is attached.
    fn data_link(&mut self) -> bool;

    /// The pause switch is engaged.
    fn paused(&mut self) -> bool {
        false
    }
}

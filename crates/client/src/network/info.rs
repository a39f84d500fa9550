//! Session information gathered during the connect handshake

use std::time::Duration;

use crate::config::SessionConfig;

/// Hardware type assumed before HWVER answers (26 + 8 pin boards)
pub const DEFAULT_HARDWARE_TYPE: u8 = 2;
/// User GPIO mask matching [`DEFAULT_HARDWARE_TYPE`]
pub const DEFAULT_USER_GPIO_MASK: u32 = 0xfbc6_cf9c;

/// Snapshot of one session's connection and board details
///
/// Written during the handshake and overwritten, never cleared, on
/// reconnect. The per-socket flags are `None` until the first connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub host: String,
    pub port: u16,
    pub pipelining: bool,
    pub command_socket: Option<bool>,
    pub notification_socket: Option<bool>,
    pub pigpio_version: u32,
    pub hw_version: u32,
    pub hardware_type: u8,
    pub user_gpio_mask: u32,
    /// Connect retry window
    pub timeout: Duration,
}

impl SessionInfo {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            pipelining: config.pipelining,
            command_socket: None,
            notification_socket: None,
            pigpio_version: 0,
            hw_version: 0,
            hardware_type: DEFAULT_HARDWARE_TYPE,
            user_gpio_mask: DEFAULT_USER_GPIO_MASK,
            timeout: config.retry_timeout,
        }
    }

    /// Record the HWVER reply and derive the board generation
    ///
    /// Revisions outside the known ranges keep the previous values.
    pub fn apply_hardware_revision(&mut self, revision: u32) {
        self.hw_version = revision;
        if let Some((hardware_type, mask)) = hardware_for_revision(revision) {
            self.hardware_type = hardware_type;
            self.user_gpio_mask = mask;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.command_socket == Some(true) && self.notification_socket == Some(true)
    }

    /// True if `gpio` is usable on this board
    pub fn is_user_gpio(&self, gpio: u32) -> bool {
        gpio < 32 && (1u32 << gpio) & self.user_gpio_mask != 0
    }
}

/// Board generation and user GPIO mask for a hardware revision
pub fn hardware_for_revision(revision: u32) -> Option<(u8, u32)> {
    match revision {
        2..=3 => Some((1, 0x03e6_cf93)),
        5..=14 => Some((2, 0xfbc6_cf9c)),
        r if r > 15 => Some((3, 0x0fff_fffc)),
        _ => None,
    }
}

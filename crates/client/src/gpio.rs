//! Per-GPIO convenience wrapper
//!
//! [`Gpio`] formats request parameters for one pin and interprets the
//! replies. It does not own a connection; it holds anything implementing
//! [`Requester`], normally a [`PigpioClient`].

use bytes::Bytes;
use protocol::commands::{FG, GDC, GPW, HP, MODEG, MODES, PFS, PUD, PWM, READ, SERVO, TRIG, WRITE};
use std::future::Future;
use std::str::FromStr;

use crate::error::{ClientError, Result};
use crate::network::{PigpioClient, Reply, SessionInfo, WatchEvent, WatcherId};

/// Longest glitch filter steady period in microseconds
pub const MAX_GLITCH_STEADY: u32 = 300_000;

/// Access to a session's request and error channels
pub trait Requester: Clone + Send + Sync + 'static {
    fn request(
        &self,
        command: u32,
        p1: u32,
        p2: u32,
        p3: u32,
    ) -> impl Future<Output = Result<Reply>> + Send;

    fn request_ext(
        &self,
        command: u32,
        p1: u32,
        p2: u32,
        extension: Bytes,
    ) -> impl Future<Output = Result<Reply>> + Send;

    fn emit_error(&self, error: ClientError) -> impl Future<Output = Result<()>> + Send;

    fn info(&self) -> impl Future<Output = Result<SessionInfo>> + Send;
}

impl Requester for PigpioClient {
    fn request(
        &self,
        command: u32,
        p1: u32,
        p2: u32,
        p3: u32,
    ) -> impl Future<Output = Result<Reply>> + Send {
        PigpioClient::request(self, command, p1, p2, p3)
    }

    fn request_ext(
        &self,
        command: u32,
        p1: u32,
        p2: u32,
        extension: Bytes,
    ) -> impl Future<Output = Result<Reply>> + Send {
        PigpioClient::request_ext(self, command, p1, p2, extension)
    }

    fn emit_error(&self, error: ClientError) -> impl Future<Output = Result<()>> + Send {
        PigpioClient::emit_error(self, error)
    }

    fn info(&self) -> impl Future<Output = Result<SessionInfo>> + Send {
        PigpioClient::info(self)
    }
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Input,
    Output,
}

impl Mode {
    fn code(self) -> u32 {
        match self {
            Mode::Input => 0,
            Mode::Output => 1,
        }
    }
}

impl FromStr for Mode {
    type Err = ClientError;

    /// Accepts any prefix of "input" or "output" of at least two letters
    fn from_str(s: &str) -> Result<Self> {
        let s = s.to_ascii_lowercase();
        if s.len() >= 2 && "output".starts_with(&s) {
            Ok(Mode::Output)
        } else if s.len() >= 2 && "input".starts_with(&s) {
            Ok(Mode::Input)
        } else {
            Err(ClientError::InvalidArgument(format!(
                "mode '{}' is not input or output",
                s
            )))
        }
    }
}

/// Internal pull resistor setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Off = 0,
    Down = 1,
    Up = 2,
}

/// What a single-pin notifier receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelEvent {
    Change { level: u8, tick: u32 },
    Stopped,
}

/// One user GPIO on a session
#[derive(Debug)]
pub struct Gpio<R> {
    pi: R,
    gpio: u32,
    notifier: Option<WatcherId>,
}

impl<R: Requester> Gpio<R> {
    /// Bind to `gpio`, checking it against the board's user GPIO mask
    pub async fn new(pi: R, gpio: u32) -> Result<Self> {
        let info = pi.info().await?;
        if !info.is_user_gpio(gpio) {
            return Err(ClientError::InvalidArgument(format!(
                "gpio {} is not a user GPIO",
                gpio
            )));
        }
        Ok(Self {
            pi,
            gpio,
            notifier: None,
        })
    }

    pub fn gpio(&self) -> u32 {
        self.gpio
    }

    pub async fn mode_set(&self, mode: Mode) -> Result<()> {
        self.pi
            .request(MODES, self.gpio, mode.code(), 0)
            .await
            .map(|_| ())
    }

    /// Raw mode code (0 input, 1 output, 2-7 alternate functions)
    pub async fn mode_get(&self) -> Result<u32> {
        Ok(self.pi.request(MODEG, self.gpio, 0, 0).await?.value)
    }

    pub async fn pull_up_down(&self, pull: Pull) -> Result<()> {
        self.pi
            .request(PUD, self.gpio, pull as u32, 0)
            .await
            .map(|_| ())
    }

    pub async fn read(&self) -> Result<u8> {
        Ok(self.pi.request(READ, self.gpio, 0, 0).await?.value as u8)
    }

    /// Level must be 0 or 1
    pub async fn write(&self, level: u8) -> Result<()> {
        if level > 1 {
            return Err(ClientError::InvalidArgument(format!(
                "level {} must be 0 or 1",
                level
            )));
        }
        self.pi
            .request(WRITE, self.gpio, level as u32, 0)
            .await
            .map(|_| ())
    }

    /// Send a trigger pulse of `length` microseconds at `level`
    pub async fn trigger(&self, length: u32, level: u8) -> Result<()> {
        let ext = Bytes::copy_from_slice(&(level as u32).to_le_bytes());
        self.pi
            .request_ext(TRIG, self.gpio, length, ext)
            .await
            .map(|_| ())
    }

    /// Software PWM duty cycle, 0 to the configured range
    pub async fn set_pwm_duty_cycle(&self, duty_cycle: u32) -> Result<()> {
        self.pi
            .request(PWM, self.gpio, duty_cycle, 0)
            .await
            .map(|_| ())
    }

    pub async fn get_pwm_duty_cycle(&self) -> Result<u32> {
        Ok(self.pi.request(GDC, self.gpio, 0, 0).await?.value)
    }

    /// Returns the frequency the daemon actually selected
    pub async fn set_pwm_frequency(&self, frequency: u32) -> Result<u32> {
        Ok(self.pi.request(PFS, self.gpio, frequency, 0).await?.value)
    }

    /// Hardware PWM; duty cycle is in millionths
    pub async fn hardware_pwm(&self, frequency: u32, duty_cycle: u32) -> Result<()> {
        let ext = Bytes::copy_from_slice(&duty_cycle.to_le_bytes());
        self.pi
            .request_ext(HP, self.gpio, frequency, ext)
            .await
            .map(|_| ())
    }

    pub async fn set_servo_pulsewidth(&self, pulse_width: u32) -> Result<()> {
        self.pi
            .request(SERVO, self.gpio, pulse_width, 0)
            .await
            .map(|_| ())
    }

    pub async fn get_servo_pulsewidth(&self) -> Result<u32> {
        Ok(self.pi.request(GPW, self.gpio, 0, 0).await?.value)
    }

    /// Fails if a notifier is already registered, also reporting the
    /// error on the session's event stream
    async fn check_no_notifier(&self) -> Result<()> {
        if self.notifier.is_none() {
            return Ok(());
        }
        let err = ClientError::InvalidArgument(format!(
            "notifier already registered for gpio {}",
            self.gpio
        ));
        self.pi.emit_error(err.clone()).await?;
        Err(err)
    }

    /// Ignore level changes shorter than `steady` microseconds
    pub async fn glitch_set(&self, steady: u32) -> Result<()> {
        if steady > MAX_GLITCH_STEADY {
            return Err(ClientError::InvalidArgument(format!(
                "steady {} exceeds {}",
                steady, MAX_GLITCH_STEADY
            )));
        }
        self.pi
            .request(FG, self.gpio, steady, 0)
            .await
            .map(|_| ())
    }
}

impl Gpio<PigpioClient> {
    /// Watch this pin; only one notifier per [`Gpio`]
    pub async fn notify<F>(&mut self, mut callback: F) -> Result<WatcherId>
    where
        F: FnMut(LevelEvent) + Send + 'static,
    {
        self.check_no_notifier().await?;
        let gpio = self.gpio;
        let id = self
            .pi
            .start_notifications(1 << gpio, move |event| match event {
                WatchEvent::Change { levels, tick } => callback(LevelEvent::Change {
                    level: ((levels >> gpio) & 1) as u8,
                    tick,
                }),
                WatchEvent::Stopped => callback(LevelEvent::Stopped),
            })
            .await?;
        self.notifier = Some(id);
        Ok(id)
    }

    /// Stop the notifier, if any
    pub async fn end_notify(&mut self) -> Result<()> {
        match self.notifier.take() {
            Some(id) => self.pi.stop_notifications(id).await,
            None => Ok(()),
        }
    }
}

//! Host adapters
//!
//! Runs the controller on a PC: a non-blocking TCP listener for the command
//! link, a thread based delay, and simulated pins that log what they are
//! driven to. Buttons are plain atomics so another thread (stdin, a test)
//! can press them.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant as StdInstant};

use core::convert::Infallible;

use embassy_time::Duration;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use log::{debug, info};

use crate::gpi::{GpiError, LightSensor};
use crate::server::{CommandConn, CommandLink, LinkError};

/// Command link over a non-blocking [`TcpListener`]
pub struct TcpLink {
    listener: TcpListener,
    read_timeout: StdDuration,
}

impl TcpLink {
    pub fn bind(addr: impl std::net::ToSocketAddrs, read_timeout: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!("listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            read_timeout: StdDuration::from_millis(read_timeout.as_millis()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl CommandLink for TcpLink {
    type Conn<'a> = TcpConn;

    fn try_accept(&mut self) -> Result<Option<TcpConn>, LinkError> {
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) => {
                debug!("accept: {}", e);
                return Err(LinkError::Accept);
            }
        };
        debug!("client {}", peer);
        // the accepted socket may inherit non-blocking mode
        stream
            .set_nonblocking(false)
            .and_then(|()| stream.set_write_timeout(Some(self.read_timeout)))
            .map_err(|_| LinkError::Accept)?;
        Ok(Some(TcpConn {
            stream,
            deadline: StdInstant::now() + self.read_timeout,
        }))
    }
}

/// One accepted TCP client, closed on drop
///
/// The whole request must arrive before `deadline`, however it is split.
pub struct TcpConn {
    stream: TcpStream,
    deadline: StdInstant,
}

impl CommandConn for TcpConn {
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let left = self.deadline.saturating_duration_since(StdInstant::now());
        if left.is_zero() {
            return Err(LinkError::Timeout);
        }
        self.stream
            .set_read_timeout(Some(left))
            .map_err(|_| LinkError::Receive)?;
        self.stream.read(buf).map_err(|e| match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => LinkError::Timeout,
            _ => LinkError::Receive,
        })
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.stream
            .write_all(bytes)
            .and_then(|()| self.stream.flush())
            .map_err(|_| LinkError::Send)
    }
}

/// [`embedded_hal_async::delay::DelayNs`] that parks the thread
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDelay;

impl embedded_hal_async::delay::DelayNs for StdDelay {
    async fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(StdDuration::from_nanos(u64::from(ns)));
    }
}

/// Push button held by an atomic; `true` while pressed
#[derive(Clone, Debug, Default)]
pub struct SimButton(pub Arc<AtomicBool>);

impl SimButton {
    pub fn set_pressed(&self, pressed: bool) {
        self.0.store(pressed, Ordering::Relaxed);
    }
}

impl digital::ErrorType for SimButton {
    type Error = Infallible;
}

impl InputPin for SimButton {
    // active low like the real wiring
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(!self.0.load(Ordering::Relaxed))
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.load(Ordering::Relaxed))
    }
}

/// Output pin that only remembers and logs its level
#[derive(Debug)]
pub struct SimOutput {
    name: &'static str,
    level: bool,
}

impl SimOutput {
    pub const fn new(name: &'static str) -> Self {
        Self { name, level: false }
    }

    fn drive(&mut self, level: bool) {
        if level != self.level {
            debug!("{} -> {}", self.name, if level { "high" } else { "low" });
        }
        self.level = level;
    }
}

impl digital::ErrorType for SimOutput {
    type Error = Infallible;
}

impl OutputPin for SimOutput {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.drive(true);
        Ok(())
    }
}

/// PWM channel standing in for the gate servo
#[derive(Debug, Default)]
pub struct SimPwm {
    duty: u16,
}

impl pwm::ErrorType for SimPwm {
    type Error = Infallible;
}

impl SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
        if duty != self.duty {
            info!("servo duty {}/{}", duty, u16::MAX);
        }
        self.duty = duty;
        Ok(())
    }
}

/// Light sensor returning whatever was last stored
#[derive(Clone, Debug, Default)]
pub struct SimLight(pub Arc<AtomicU16>);

impl LightSensor for SimLight {
    fn read_raw(&mut self) -> Result<u16, GpiError> {
        Ok(self.0.load(Ordering::Relaxed))
    }
}

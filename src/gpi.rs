//! GPI (General Purpose Input) module
//!
//! Samples the entry/exit buttons and the two ambient light sensors. Raw
//! levels only: edge detection happens in the scheduler.

use embedded_hal::digital::{self, InputPin};
use log::warn;

use crate::types::{GpiSample, LightReadings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GpiError {
    #[error("input pin error: {0:?}")]
    Pin(digital::ErrorKind),
    #[error("light sensor read failed")]
    Light,
}

/// Ambient light sensor behind an ADC channel
///
/// Low values mean light (space empty), high values dark. The controller
/// only reports them; occupancy is never derived from these readings.
pub trait LightSensor {
    fn read_raw(&mut self) -> Result<u16, GpiError>;
}

/// Source of one raw input sample per tick
pub trait Inputs {
    fn sample(&mut self) -> GpiSample;
}

/// Inputs of the gate controller
///
/// Buttons switch to ground against a pull-up, so a low level is a press.
pub struct Gpi<B, L> {
    entry: B,
    exit: B,
    light: [L; 2],
}

impl<B: InputPin, L: LightSensor> Gpi<B, L> {
    pub fn new(entry: B, exit: B, light: [L; 2]) -> Self {
        Self { entry, exit, light }
    }

    pub fn read_light(&mut self) -> LightReadings {
        let mut raw = [0u16; 2];
        for (slot, sensor) in raw.iter_mut().zip(self.light.iter_mut()) {
            *slot = sensor.read_raw().unwrap_or_else(|e| {
                warn!("gpi: {}", e);
                0
            });
        }
        LightReadings(raw)
    }
}

impl<B: InputPin, L: LightSensor> Inputs for Gpi<B, L> {
    fn sample(&mut self) -> GpiSample {
        GpiSample {
            entry_pressed: pressed(&mut self.entry, "entry"),
            exit_pressed: pressed(&mut self.exit, "exit"),
            light: self.read_light(),
        }
    }
}

fn pressed<B: InputPin>(pin: &mut B, name: &str) -> bool {
    match pin.is_low() {
        Ok(low) => low,
        Err(e) => {
            warn!("gpi: {} button unreadable: {}", name, GpiError::Pin(digital::Error::kind(&e)));
            false
        }
    }
}

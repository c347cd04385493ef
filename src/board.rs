//! ESP32-C6 board wiring
//!
//! Adapters between esp-hal drivers and the controller traits: the two
//! light sensors share ADC1, and the gate servo runs on a 50 Hz LEDC channel.

use core::cell::RefCell;

use esp_hal::analog::adc::{Adc, AdcConfig, AdcPin, Attenuation};
use esp_hal::gpio::interconnect::PeripheralOutput;
use esp_hal::ledc::channel::{self, ChannelIFace};
use esp_hal::ledc::timer::{self, TimerIFace};
use esp_hal::ledc::{LSGlobalClkSource, Ledc, LowSpeed};
use esp_hal::peripherals::{ADC1, GPIO5, GPIO6, LEDC};
use esp_hal::time::Rate;
use esp_hal::Blocking;
use log::warn;
use static_cell::StaticCell;

use crate::gpi::{GpiError, LightSensor};

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("servo timer setup failed")]
    ServoTimer,
    #[error("servo channel setup failed")]
    ServoChannel,
}

/// ADC1 with both light sensor inputs attached
pub struct LightAdc {
    adc: Adc<'static, ADC1<'static>, Blocking>,
    left: AdcPin<GPIO5<'static>, ADC1<'static>>,
    right: AdcPin<GPIO6<'static>, ADC1<'static>>,
}

static LIGHT_ADC: StaticCell<RefCell<LightAdc>> = StaticCell::new();
static SERVO_TIMER: StaticCell<timer::Timer<'static, LowSpeed>> = StaticCell::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// One light sensor; both share the converter
pub struct LightChannel {
    adc: &'static RefCell<LightAdc>,
    side: Side,
}

/// Sets up ADC1 for the light sensors (full scale, 11 dB)
pub fn light_sensors(adc1: ADC1<'static>, left: GPIO5<'static>, right: GPIO6<'static>) -> [LightChannel; 2] {
    let mut config = AdcConfig::new();
    let left = config.enable_pin(left, Attenuation::_11dB);
    let right = config.enable_pin(right, Attenuation::_11dB);
    let adc = LIGHT_ADC.init(RefCell::new(LightAdc {
        adc: Adc::new(adc1, config),
        left,
        right,
    }));
    [
        LightChannel { adc, side: Side::Left },
        LightChannel { adc, side: Side::Right },
    ]
}

impl LightSensor for LightChannel {
    fn read_raw(&mut self) -> Result<u16, GpiError> {
        let mut shared = self.adc.try_borrow_mut().map_err(|_| GpiError::Light)?;
        let LightAdc { adc, left, right } = &mut *shared;
        Ok(match self.side {
            Side::Left => adc.read_blocking(left),
            Side::Right => adc.read_blocking(right),
        })
    }
}

/// 50 Hz low speed LEDC channel for the gate servo
pub fn servo_pwm(
    ledc: LEDC<'static>,
    pin: impl PeripheralOutput<'static>,
) -> Result<channel::Channel<'static, LowSpeed>, BoardError> {
    let mut ledc = Ledc::new(ledc);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);

    let mut servo_timer = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    servo_timer
        .configure(timer::config::Config {
            duty: timer::config::Duty::Duty14Bit,
            clock_source: timer::LSClockSource::APBClk,
            frequency: Rate::from_hz(50),
        })
        .map_err(|e| {
            warn!("ledc timer: {:?}", e);
            BoardError::ServoTimer
        })?;
    let servo_timer = SERVO_TIMER.init(servo_timer);

    let mut servo = ledc.channel(channel::Number::Channel0, pin);
    servo
        .configure(channel::config::Config {
            timer: servo_timer,
            duty_pct: 0,
            pin_config: channel::config::PinConfig::PushPull,
        })
        .map_err(|e| {
            warn!("ledc channel: {:?}", e);
            BoardError::ServoChannel
        })?;
    Ok(servo)
}

//! GPO (General Purpose Output) module
//!
//! Drives the gate servo, the seven segment digit and the per-space
//! indicators. The only state kept here is the last commanded gate
//! position and digit.

use embedded_hal::digital::{self, OutputPin, PinState};
use embedded_hal::pwm::{self, SetDutyCycle};
use log::debug;

use crate::types::SPACES;

/// SG90 style hobby servo timing
const PERIOD_US: u32 = 20_000; // 50 Hz
const MIN_PULSE_US: u32 = 500; // 0°
const MAX_PULSE_US: u32 = 2_500; // 180°

/// Segment patterns a..g, common cathode (true = lit)
const DIGITS: [[bool; 7]; 10] = [
    [true, true, true, true, true, true, false],
    [false, true, true, false, false, false, false],
    [true, true, false, true, true, false, true],
    [true, true, true, true, false, false, true],
    [false, true, true, false, false, true, true],
    [true, false, true, true, false, true, true],
    [true, false, true, true, true, true, true],
    [true, true, true, false, false, false, false],
    [true, true, true, true, true, true, true],
    [true, true, true, true, false, true, true],
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GpoError {
    #[error("output pin error: {0:?}")]
    Pin(digital::ErrorKind),
    #[error("pwm error: {0:?}")]
    Pwm(pwm::ErrorKind),
}

fn pin_err<E: digital::Error>(e: E) -> GpoError {
    GpoError::Pin(digital::Error::kind(&e))
}

/// Output commands, one per physical concern
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpoCommand {
    SetGate { open: bool },
    ShowDigit(u8),
    SetIndicators([bool; SPACES]),
}

/// Everything the state machine and the command server may drive
pub trait Actuators {
    fn apply(&mut self, cmd: GpoCommand) -> Result<(), GpoError>;

    fn drive_gate(&mut self, open: bool) -> Result<(), GpoError> {
        self.apply(GpoCommand::SetGate { open })
    }

    fn show_digit(&mut self, digit: u8) -> Result<(), GpoError> {
        self.apply(GpoCommand::ShowDigit(digit))
    }

    fn drive_indicators(&mut self, lit: [bool; SPACES]) -> Result<(), GpoError> {
        self.apply(GpoCommand::SetIndicators(lit))
    }
}

/// Hobby servo on a 50 Hz PWM channel
pub struct Servo<P> {
    pwm: P,
}

impl<P: SetDutyCycle> Servo<P> {
    /// `pwm` must already run at 50 Hz
    pub fn new(pwm: P) -> Self {
        Self { pwm }
    }

    /// Set servo angle (0–180 degrees)
    pub fn set_angle(&mut self, angle: u8) -> Result<(), GpoError> {
        let duty = angle_to_duty(angle, self.pwm.max_duty_cycle());
        self.pwm
            .set_duty_cycle(duty)
            .map_err(|e| GpoError::Pwm(pwm::Error::kind(&e)))
    }
}

fn angle_to_duty(angle: u8, max_duty: u16) -> u16 {
    let angle = angle.min(180) as u32;
    let pulse_us = MIN_PULSE_US + angle * (MAX_PULSE_US - MIN_PULSE_US) / 180;
    (pulse_us * max_duty as u32 / PERIOD_US) as u16
}

/// Single seven segment digit, pins a, b, c, d, e, f, g then dp
pub struct SevenSegment<P> {
    segments: [P; 7],
    dp: P,
}

impl<P: OutputPin> SevenSegment<P> {
    pub fn new(segments: [P; 7], dp: P) -> Self {
        Self { segments, dp }
    }

    /// Digits above 9 render as 0
    pub fn show(&mut self, digit: u8) -> Result<(), GpoError> {
        let pattern = DIGITS.get(digit as usize).unwrap_or(&DIGITS[0]);
        for (pin, lit) in self.segments.iter_mut().zip(pattern) {
            pin.set_state(PinState::from(*lit)).map_err(pin_err)?;
        }
        self.dp.set_low().map_err(pin_err)
    }
}

/// Physical outputs of the gate controller
pub struct Gpo<S, P> {
    servo: Servo<S>,
    display: SevenSegment<P>,
    indicators: [P; SPACES],
    open_angle: u8,
    closed_angle: u8,
    last_gate: Option<bool>,
    last_digit: Option<u8>,
}

impl<S: SetDutyCycle, P: OutputPin> Gpo<S, P> {
    pub fn new(
        servo: Servo<S>,
        display: SevenSegment<P>,
        indicators: [P; SPACES],
        open_angle: u8,
        closed_angle: u8,
    ) -> Self {
        Self {
            servo,
            display,
            indicators,
            open_angle,
            closed_angle,
            last_gate: None,
            last_digit: None,
        }
    }

    /// Last commanded gate position, `None` before the first command
    pub fn last_gate(&self) -> Option<bool> {
        self.last_gate
    }

    /// Last digit shown, `None` before the first command
    pub fn last_digit(&self) -> Option<u8> {
        self.last_digit
    }
}

impl<S: SetDutyCycle, P: OutputPin> Actuators for Gpo<S, P> {
    fn apply(&mut self, cmd: GpoCommand) -> Result<(), GpoError> {
        match cmd {
            GpoCommand::SetGate { open } => {
                let angle = if open { self.open_angle } else { self.closed_angle };
                debug!("gpo: gate {} ({}°)", if open { "open" } else { "closed" }, angle);
                self.servo.set_angle(angle)?;
                self.last_gate = Some(open);
            }
            GpoCommand::ShowDigit(digit) => {
                if self.last_digit != Some(digit) {
                    self.display.show(digit)?;
                    self.last_digit = Some(digit);
                }
            }
            GpoCommand::SetIndicators(lit) => {
                for (pin, on) in self.indicators.iter_mut().zip(lit) {
                    pin.set_state(PinState::from(on)).map_err(pin_err)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording pins shared by the unit tests

    use alloc::rc::Rc;
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;

    use alloc::vec::Vec;

    use super::*;

    #[derive(Clone, Default)]
    pub struct MockPin(pub Rc<Cell<bool>>);

    impl digital::ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.set(true);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    pub struct MockPwm(pub Rc<RefCell<Vec<u16>>>);

    impl pwm::ErrorType for MockPwm {
        type Error = Infallible;
    }

    impl SetDutyCycle for MockPwm {
        fn max_duty_cycle(&self) -> u16 {
            u16::MAX
        }

        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
            self.0.borrow_mut().push(duty);
            Ok(())
        }
    }

    /// Actuators that only record what they were told
    #[derive(Default)]
    pub struct Recorder {
        pub commands: Vec<GpoCommand>,
    }

    impl Recorder {
        pub fn gate_moves(&self) -> Vec<bool> {
            self.commands
                .iter()
                .filter_map(|c| match c {
                    GpoCommand::SetGate { open } => Some(*open),
                    _ => None,
                })
                .collect()
        }

        pub fn last_digit(&self) -> Option<u8> {
            self.commands.iter().rev().find_map(|c| match c {
                GpoCommand::ShowDigit(d) => Some(*d),
                _ => None,
            })
        }

        pub fn last_indicators(&self) -> Option<[bool; SPACES]> {
            self.commands.iter().rev().find_map(|c| match c {
                GpoCommand::SetIndicators(lit) => Some(*lit),
                _ => None,
            })
        }
    }

    impl Actuators for Recorder {
        fn apply(&mut self, cmd: GpoCommand) -> Result<(), GpoError> {
            self.commands.push(cmd);
            Ok(())
        }
    }

    /// Delay that returns at once and remembers how long it was asked to wait
    #[derive(Default)]
    pub struct NoDelay {
        pub total_ns: u64,
    }

    impl embedded_hal_async::delay::DelayNs for NoDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.total_ns += u64::from(ns);
        }
    }

    pub fn pins<const N: usize>() -> [MockPin; N] {
        core::array::from_fn(|_| MockPin::default())
    }

    pub fn levels(pins: &[MockPin]) -> Vec<bool> {
        pins.iter().map(|p| p.0.get()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;

    fn gpo() -> (Gpo<MockPwm, MockPin>, MockPwm, [MockPin; 7], [MockPin; SPACES]) {
        let pwm = MockPwm::default();
        let segs = pins::<7>();
        let leds = pins::<SPACES>();
        let gpo = Gpo::new(
            Servo::new(pwm.clone()),
            SevenSegment::new(segs.clone(), MockPin::default()),
            leds.clone(),
            90,
            0,
        );
        (gpo, pwm, segs, leds)
    }

    #[test]
    fn servo_pulse_width_spans_half_to_two_and_a_half_ms() {
        assert_eq!(angle_to_duty(0, 20_000), 500);
        assert_eq!(angle_to_duty(90, 20_000), 1_500);
        assert_eq!(angle_to_duty(180, 20_000), 2_500);
        assert_eq!(angle_to_duty(250, 20_000), 2_500);
    }

    #[test]
    fn gate_command_moves_servo_and_remembers_position() {
        let (mut gpo, pwm, _, _) = gpo();
        assert_eq!(gpo.last_gate(), None);
        gpo.drive_gate(true).unwrap();
        gpo.drive_gate(false).unwrap();
        assert_eq!(gpo.last_gate(), Some(false));
        let duties = pwm.0.borrow();
        assert_eq!(duties.len(), 2);
        assert!(duties[0] > duties[1]);
    }

    #[test]
    fn digits_render_segment_patterns() {
        let (mut gpo, _, segs, _) = gpo();
        gpo.show_digit(1).unwrap();
        assert_eq!(levels(&segs), [false, true, true, false, false, false, false]);
        gpo.show_digit(8).unwrap();
        assert!(levels(&segs).iter().all(|on| *on));
        assert_eq!(gpo.last_digit(), Some(8));
    }

    #[test]
    fn out_of_range_digit_shows_zero() {
        let (mut gpo, _, segs, _) = gpo();
        gpo.show_digit(12).unwrap();
        assert_eq!(levels(&segs), DIGITS[0]);
    }

    #[test]
    fn indicators_follow_flags() {
        let (mut gpo, _, _, leds) = gpo();
        gpo.drive_indicators([true, false, true]).unwrap();
        assert_eq!(levels(&leds), [true, false, true]);
    }
}

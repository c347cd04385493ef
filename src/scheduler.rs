//! Scheduler loop
//!
//! One cooperative loop drives everything. Each tick, in order:
//!
//! 1. sample the inputs and detect released-to-pressed edges
//! 2. run the entry, then the exit transition for any detected press
//! 3. refresh the digit display and the space indicators
//! 4. attempt exactly one non-blocking accept on the command link
//! 5. sleep for what is left of the tick
//!
//! A gate pulse inside step 2 holds the loop for the whole dwell time.

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use log::{debug, info, warn};

use crate::fsm::{EntryOutcome, ExitOutcome, Fsm};
use crate::gpi::Inputs;
use crate::gpo::Actuators;
use crate::server::{self, CommandLink, ServeOutcome};
use crate::settings::Settings;
use crate::types::{ButtonEdges, SPACES};

/// Self test: how long the servo holds each position
const SERVO_TEST_HOLD: Duration = Duration::from_secs(1);
/// Self test: how long the indicators stay on, then off
const LAMP_TEST_ON: Duration = Duration::from_secs(1);
const LAMP_TEST_OFF: Duration = Duration::from_millis(500);

/// Press detection by comparison with the previous sample
///
/// No time based filtering: the tick period is the only debounce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeDetector {
    previous: bool,
}

impl EdgeDetector {
    pub const fn new(pressed: bool) -> Self {
        Self { previous: pressed }
    }

    /// True once per released-to-pressed transition
    pub fn update(&mut self, pressed: bool) -> bool {
        let edge = pressed && !self.previous;
        self.previous = pressed;
        edge
    }
}

/// What happened during one tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub edges: ButtonEdges,
    pub entry: Option<EntryOutcome>,
    pub exit: Option<ExitOutcome>,
    pub served: ServeOutcome,
}

pub struct Scheduler<I, A, L, D> {
    fsm: Fsm,
    inputs: I,
    act: A,
    link: L,
    delay: D,
    settings: Settings,
    entry: EdgeDetector,
    exit: EdgeDetector,
}

impl<I, A, L, D> Scheduler<I, A, L, D>
where
    I: Inputs,
    A: Actuators,
    L: CommandLink,
    D: DelayNs,
{
    pub fn new(settings: Settings, inputs: I, act: A, link: L, delay: D) -> Self {
        Self {
            fsm: Fsm::new(&settings),
            inputs,
            act,
            link,
            delay,
            settings,
            entry: EdgeDetector::new(false),
            exit: EdgeDetector::new(false),
        }
    }

    pub fn fsm(&self) -> &Fsm {
        &self.fsm
    }

    pub fn actuators(&self) -> &A {
        &self.act
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Startup: optional self test, gate closed, outputs in sync, and the
    /// edge detectors primed so a button held at power-up is not a press
    pub async fn boot(&mut self) {
        if self.settings.self_test() {
            self.self_test().await;
        }
        self.fsm.set_gate(&mut self.act, false);
        self.delay.delay_ms(as_ms(self.settings.settle())).await;
        self.refresh_outputs();

        let sample = self.inputs.sample();
        self.entry = EdgeDetector::new(sample.entry_pressed);
        self.exit = EdgeDetector::new(sample.exit_pressed);
        info!(
            "controller ready, {} of {} spaces free",
            self.fsm.free_spaces(),
            SPACES
        );
    }

    /// Component check: every digit, a gate sweep, all indicators on/off
    pub async fn self_test(&mut self) {
        info!("self test: display");
        for digit in 0..=9 {
            check(self.act.show_digit(digit));
            self.delay.delay_ms(as_ms(self.settings.self_test_step())).await;
        }

        info!("self test: gate");
        for open in [false, true, false] {
            check(self.act.drive_gate(open));
            self.delay.delay_ms(as_ms(SERVO_TEST_HOLD)).await;
        }

        info!("self test: indicators");
        check(self.act.drive_indicators([true; SPACES]));
        self.delay.delay_ms(as_ms(LAMP_TEST_ON)).await;
        check(self.act.drive_indicators([false; SPACES]));
        self.delay.delay_ms(as_ms(LAMP_TEST_OFF)).await;
        info!("self test complete");
    }

    /// One pass of the loop, without the trailing sleep
    pub async fn tick(&mut self) -> TickReport {
        let sample = self.inputs.sample();
        let edges = ButtonEdges {
            entry: self.entry.update(sample.entry_pressed),
            exit: self.exit.update(sample.exit_pressed),
        };
        debug!("tick: {:?} light {:?}", edges, sample.light.0);

        let entry = if edges.entry {
            info!("entry button pressed");
            Some(
                self.fsm
                    .request_entry(&mut self.act, &mut self.delay, Instant::now)
                    .await,
            )
        } else {
            None
        };
        let exit = if edges.exit {
            info!("exit button pressed");
            Some(
                self.fsm
                    .request_exit(&mut self.act, &mut self.delay, Instant::now())
                    .await,
            )
        } else {
            None
        };

        self.refresh_outputs();

        let served = server::serve_once(
            &mut self.link,
            &mut self.fsm,
            &mut self.act,
            sample.light,
            Instant::now(),
        );
        if let ServeOutcome::Handled(_) = served {
            self.refresh_outputs();
        }

        TickReport {
            edges,
            entry,
            exit,
            served,
        }
    }

    /// Runs forever at the configured tick cadence
    pub async fn run(&mut self) -> ! {
        let period = self.settings.tick();
        loop {
            let started = Instant::now();
            self.tick().await;
            let spent = Instant::now()
                .checked_duration_since(started)
                .unwrap_or(Duration::from_ticks(0));
            if spent < period {
                self.delay.delay_ms(as_ms(period - spent)).await;
            } else {
                debug!("tick overran by {} ms", (spent - period).as_millis());
            }
        }
    }

    fn refresh_outputs(&mut self) {
        check(self.act.show_digit(self.fsm.display_digit()));
        check(self.act.drive_indicators(self.fsm.occupancy().indicators()));
    }
}

fn check(result: Result<(), crate::gpo::GpoError>) {
    if let Err(e) = result {
        warn!("output update failed: {}", e);
    }
}

fn as_ms(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::gpi::mock::{MockButton, MockLight};
    use crate::gpi::Gpi;
    use crate::gpo::mock::{NoDelay, Recorder};
    use crate::protocol::Command;
    use crate::server::mock::ScriptedLink;
    use crate::settings::ConfigSlot;
    use crate::types::{FsmState, VehicleId};

    struct Panel {
        entry: MockButton,
        exit: MockButton,
    }

    fn scheduler(
        settings: Settings,
    ) -> (
        Scheduler<Gpi<MockButton, MockLight>, Recorder, ScriptedLink, NoDelay>,
        Panel,
    ) {
        let entry = MockButton::default();
        let exit = MockButton::default();
        let gpi = Gpi::new(
            entry.clone(),
            exit.clone(),
            [MockLight::default(), MockLight::default()],
        );
        let sched = Scheduler::new(
            settings,
            gpi,
            Recorder::default(),
            ScriptedLink::default(),
            NoDelay::default(),
        );
        (sched, Panel { entry, exit })
    }

    fn quiet() -> Settings {
        Settings::default().with(ConfigSlot::SelfTest, 0)
    }

    #[test]
    fn edge_detector_fires_once_per_press() {
        let mut d = EdgeDetector::new(false);
        assert!(d.update(true));
        assert!(!d.update(true));
        assert!(!d.update(false));
        assert!(d.update(true));
    }

    #[test]
    fn held_button_at_boot_is_not_a_press() {
        let (mut s, panel) = scheduler(quiet());
        panel.entry.press();
        block_on(s.boot());
        let report = block_on(s.tick());
        assert!(!report.edges.entry);
        assert_eq!(s.fsm().free_spaces(), SPACES);
    }

    #[test]
    fn boot_closes_gate_and_shows_free_spaces() {
        let (mut s, _panel) = scheduler(quiet());
        block_on(s.boot());
        assert_eq!(s.actuators().gate_moves(), [false]);
        assert_eq!(s.actuators().last_digit(), Some(3));
        assert_eq!(s.actuators().last_indicators(), Some([true; SPACES]));
    }

    #[test]
    fn self_test_walks_every_digit() {
        let (mut s, _panel) = scheduler(Settings::default());
        block_on(s.boot());
        let digits: alloc::vec::Vec<u8> = s
            .actuators()
            .commands
            .iter()
            .filter_map(|c| match c {
                crate::gpo::GpoCommand::ShowDigit(d) => Some(*d),
                _ => None,
            })
            .collect();
        assert_eq!(&digits[..10], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(s.actuators().gate_moves(), [false, true, false, false]);
    }

    #[test]
    fn press_and_release_drive_the_two_step_exit() {
        let (mut s, panel) = scheduler(quiet());
        block_on(s.boot());

        panel.entry.press();
        let report = block_on(s.tick());
        assert!(matches!(report.entry, Some(EntryOutcome::Admitted { .. })));
        assert_eq!(s.actuators().last_digit(), Some(2));
        assert_eq!(s.actuators().last_indicators(), Some([true, true, false]));

        // still held: no second entry
        let report = block_on(s.tick());
        assert_eq!(report.entry, None);
        panel.entry.release();
        block_on(s.tick());

        panel.exit.press();
        let report = block_on(s.tick());
        assert!(matches!(report.exit, Some(ExitOutcome::FeeShown(_))));
        assert!(s.fsm().state().is_awaiting_payment());
        panel.exit.release();
        block_on(s.tick());
        assert_eq!(s.fsm().free_spaces(), 2);

        panel.exit.press();
        let report = block_on(s.tick());
        assert!(matches!(report.exit, Some(ExitOutcome::Released { .. })));
        assert_eq!(s.fsm().state(), FsmState::Idle);
        assert_eq!(s.fsm().free_spaces(), 3);
        assert_eq!(s.actuators().last_digit(), Some(3));
    }

    #[test]
    fn fee_digit_stays_on_display_while_awaiting_confirmation() {
        let (mut s, panel) = scheduler(quiet());
        block_on(s.boot());
        panel.entry.press();
        block_on(s.tick());
        panel.entry.release();
        panel.exit.press();
        block_on(s.tick());

        let fee_digit = s.fsm().pending_fee().unwrap().digit();
        for _ in 0..3 {
            block_on(s.tick());
            assert_eq!(s.actuators().last_digit(), Some(fee_digit));
        }
    }

    #[test]
    fn one_accept_attempt_per_tick() {
        let (mut s, _panel) = scheduler(quiet());
        block_on(s.boot());
        s.link_mut().client(&[br#"{"action":"session","vehicle_id":1,"kind":"entry"}"#]);
        s.link_mut().client(&[br#"{"action":"session","vehicle_id":2,"kind":"entry"}"#]);

        let first = block_on(s.tick());
        assert!(matches!(first.served, ServeOutcome::Handled(Command::Session { .. })));
        assert_eq!(s.fsm().ledger().len(), 1);
        assert!(s.fsm().ledger().contains(VehicleId(1)));

        block_on(s.tick());
        assert_eq!(s.fsm().ledger().len(), 2);
        let idle = block_on(s.tick());
        assert_eq!(idle.served, ServeOutcome::Idle);
        assert_eq!(s.link_mut().accepts, 3);
    }

    #[test]
    fn remote_led_override_reaches_display_in_same_tick() {
        let (mut s, _panel) = scheduler(quiet());
        block_on(s.boot());
        s.link_mut().client(&[br#"{"action":"led","space":1,"value":false}"#]);
        block_on(s.tick());
        assert_eq!(s.actuators().last_digit(), Some(2));
        assert_eq!(s.actuators().last_indicators(), Some([false, true, true]));
    }

    #[test]
    fn garbage_from_the_network_does_not_stop_the_loop() {
        let (mut s, panel) = scheduler(quiet());
        block_on(s.boot());
        s.link_mut().client(&[b"\x00\x01garbage"]);
        let report = block_on(s.tick());
        assert_eq!(report.served, ServeOutcome::Dropped);

        panel.entry.press();
        let report = block_on(s.tick());
        assert!(matches!(report.entry, Some(EntryOutcome::Admitted { .. })));
    }
}

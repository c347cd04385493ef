//! Parking gate controller, host build
//!
//! Runs the full controller loop on a PC with simulated pins. The command
//! server listens on TCP exactly as the device does.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --bin park_gate_host
//! PARK_GATE_PORT=9000 PARK_GATE_SELF_TEST=0 cargo run --bin park_gate_host
//! ```
//!
//! Type `e` + Enter to press the entry button, `x` + Enter for exit.
//!
//! ```bash
//! echo '{"action":"state"}' | nc -q1 127.0.0.1 8080
//! ```

use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use park_gate::gpo::{Gpo, Servo, SevenSegment};
use park_gate::gpi::Gpi;
use park_gate::host::{SimButton, SimLight, SimOutput, SimPwm, StdDelay, TcpLink};
use park_gate::{Scheduler, Settings};

const ENV_PREFIX: &str = "PARK_GATE_";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_lookup(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok());

    let entry = SimButton::default();
    let exit = SimButton::default();
    let gpi = Gpi::new(
        entry.clone(),
        exit.clone(),
        [SimLight::default(), SimLight::default()],
    );

    let segments = ["seg_a", "seg_b", "seg_c", "seg_d", "seg_e", "seg_f", "seg_g"].map(SimOutput::new);
    let gpo = Gpo::new(
        Servo::new(SimPwm::default()),
        SevenSegment::new(segments, SimOutput::new("seg_dp")),
        ["space_1", "space_2", "space_3"].map(SimOutput::new),
        settings.gate_open_angle(),
        settings.gate_closed_angle(),
    );

    let link = TcpLink::bind(("0.0.0.0", settings.port()), settings.read_timeout())?;

    // a press must outlast at least one tick to be sampled
    let hold = Duration::from_millis(settings.tick().as_millis() * 2);
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let button = match line.trim() {
                "e" => &entry,
                "x" => &exit,
                "" => continue,
                other => {
                    eprintln!("unknown input {other:?}, use e or x");
                    continue;
                }
            };
            button.set_pressed(true);
            thread::sleep(hold);
            button.set_pressed(false);
        }
    });

    let mut scheduler = Scheduler::new(settings, gpi, gpo, link, StdDelay);
    embassy_futures::block_on(async {
        scheduler.boot().await;
        scheduler.run().await
    })
}

use core::str::FromStr;

use embassy_time::Duration;
use log::{info, warn};

/// Tunable controller parameters; the discriminant is the slot index
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigSlot {
    TickMs = 0,
    GateDwellMs = 1,
    SettleMs = 2,
    SelfTest = 3,
    Port = 4,
    ReadTimeoutMs = 5,
    GateOpenAngle = 6,
    GateClosedAngle = 7,
    SelfTestStepMs = 8,
}

const SLOT_COUNT: usize = 9;

impl ConfigSlot {
    pub const ALL: [ConfigSlot; SLOT_COUNT] = [
        ConfigSlot::TickMs,
        ConfigSlot::GateDwellMs,
        ConfigSlot::SettleMs,
        ConfigSlot::SelfTest,
        ConfigSlot::Port,
        ConfigSlot::ReadTimeoutMs,
        ConfigSlot::GateOpenAngle,
        ConfigSlot::GateClosedAngle,
        ConfigSlot::SelfTestStepMs,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Name used for overrides, e.g. `GATE_DWELL_MS`
    pub const fn name(self) -> &'static str {
        match self {
            ConfigSlot::TickMs => "TICK_MS",
            ConfigSlot::GateDwellMs => "GATE_DWELL_MS",
            ConfigSlot::SettleMs => "SETTLE_MS",
            ConfigSlot::SelfTest => "SELF_TEST",
            ConfigSlot::Port => "PORT",
            ConfigSlot::ReadTimeoutMs => "READ_TIMEOUT_MS",
            ConfigSlot::GateOpenAngle => "GATE_OPEN_ANGLE",
            ConfigSlot::GateClosedAngle => "GATE_CLOSED_ANGLE",
            ConfigSlot::SelfTestStepMs => "SELF_TEST_STEP_MS",
        }
    }

    pub const fn default_value(self) -> u32 {
        match self {
            ConfigSlot::TickMs => 100,
            ConfigSlot::GateDwellMs => 3000,
            ConfigSlot::SettleMs => 500,
            ConfigSlot::SelfTest => 1,
            ConfigSlot::Port => 8080,
            ConfigSlot::ReadTimeoutMs => 250,
            ConfigSlot::GateOpenAngle => 90,
            ConfigSlot::GateClosedAngle => 0,
            ConfigSlot::SelfTestStepMs => 300,
        }
    }
}

/// Controller settings, defaults overridable per slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    values: [u32; SLOT_COUNT],
}

impl Default for Settings {
    fn default() -> Self {
        let mut values = [0; SLOT_COUNT];
        for slot in ConfigSlot::ALL {
            values[slot.as_u8() as usize] = slot.default_value();
        }
        Self { values }
    }
}

impl Settings {
    /// Builds settings from defaults, overriding every slot `lookup` knows
    ///
    /// `lookup` receives the slot name (see [`ConfigSlot::name`]). Values that
    /// do not parse keep the default.
    pub fn from_lookup<F, S>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<S>,
        S: AsRef<str>,
    {
        let mut settings = Self::default();
        for slot in ConfigSlot::ALL {
            let Some(raw) = lookup(slot.name()) else {
                continue;
            };
            match u32::from_str(raw.as_ref().trim()) {
                Ok(value) => {
                    info!("settings: {} = {}", slot.name(), value);
                    settings.set(slot, value);
                }
                Err(_) => warn!(
                    "settings: ignoring {}={:?}, keeping {}",
                    slot.name(),
                    raw.as_ref(),
                    slot.default_value()
                ),
            }
        }
        settings
    }

    pub fn get(&self, slot: ConfigSlot) -> u32 {
        self.values[slot.as_u8() as usize]
    }

    pub fn set(&mut self, slot: ConfigSlot, value: u32) {
        self.values[slot.as_u8() as usize] = value;
    }

    pub fn with(mut self, slot: ConfigSlot, value: u32) -> Self {
        self.set(slot, value);
        self
    }

    fn millis(&self, slot: ConfigSlot) -> Duration {
        Duration::from_millis(self.get(slot).into())
    }

    pub fn tick(&self) -> Duration {
        self.millis(ConfigSlot::TickMs)
    }

    pub fn gate_dwell(&self) -> Duration {
        self.millis(ConfigSlot::GateDwellMs)
    }

    pub fn settle(&self) -> Duration {
        self.millis(ConfigSlot::SettleMs)
    }

    pub fn read_timeout(&self) -> Duration {
        self.millis(ConfigSlot::ReadTimeoutMs)
    }

    pub fn self_test_step(&self) -> Duration {
        self.millis(ConfigSlot::SelfTestStepMs)
    }

    pub fn self_test(&self) -> bool {
        self.get(ConfigSlot::SelfTest) != 0
    }

    pub fn port(&self) -> u16 {
        u16::try_from(self.get(ConfigSlot::Port)).unwrap_or(8080)
    }

    pub fn gate_open_angle(&self) -> u8 {
        self.get(ConfigSlot::GateOpenAngle).min(180) as u8
    }

    pub fn gate_closed_angle(&self) -> u8 {
        self.get(ConfigSlot::GateClosedAngle).min(180) as u8
    }
}

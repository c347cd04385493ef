#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_time::Delay;
use esp_backtrace as _;
use esp_hal::{
    clock::CpuClock,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    timer::timg::TimerGroup,
};
use esp_println::println;
use park_gate::board;
use park_gate::gpi::Gpi;
use park_gate::gpo::{Gpo, Servo, SevenSegment};
use park_gate::net::{self, ChannelLink};
use park_gate::{Scheduler, Settings};

esp_bootloader_esp_idf::esp_app_desc!();

const WIFI_SSID: &str = match option_env!("PARK_GATE_WIFI_SSID") {
    Some(ssid) => ssid,
    None => "parking",
};
const WIFI_PASSWORD: &str = match option_env!("PARK_GATE_WIFI_PASSWORD") {
    Some(password) => password,
    None => "",
};

/// Settings are baked in at build time, e.g. `PARK_GATE_GATE_DWELL_MS=5000`
fn build_setting(name: &str) -> Option<&'static str> {
    match name {
        "TICK_MS" => option_env!("PARK_GATE_TICK_MS"),
        "GATE_DWELL_MS" => option_env!("PARK_GATE_GATE_DWELL_MS"),
        "SETTLE_MS" => option_env!("PARK_GATE_SETTLE_MS"),
        "SELF_TEST" => option_env!("PARK_GATE_SELF_TEST"),
        "PORT" => option_env!("PARK_GATE_PORT"),
        "READ_TIMEOUT_MS" => option_env!("PARK_GATE_READ_TIMEOUT_MS"),
        "GATE_OPEN_ANGLE" => option_env!("PARK_GATE_GATE_OPEN_ANGLE"),
        "GATE_CLOSED_ANGLE" => option_env!("PARK_GATE_GATE_CLOSED_ANGLE"),
        "SELF_TEST_STEP_MS" => option_env!("PARK_GATE_SELF_TEST_STEP_MS"),
        _ => None,
    }
}

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    esp_println::logger::init_logger_from_env();
    let peripherals = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::max()));
    esp_alloc::heap_allocator!(size: 72 * 1024);

    let settings = Settings::from_lookup(build_setting);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    #[cfg(target_arch = "riscv32")]
    let software_interrupt =
        esp_hal::interrupt::software::SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);

    esp_rtos::start(
        timg0.timer0,
        #[cfg(target_arch = "riscv32")]
        software_interrupt.software_interrupt0,
    );

    // Buttons switch to ground
    let entry = Input::new(peripherals.GPIO15, InputConfig::default().with_pull(Pull::Up));
    let exit = Input::new(peripherals.GPIO14, InputConfig::default().with_pull(Pull::Up));
    let light = board::light_sensors(peripherals.ADC1, peripherals.GPIO5, peripherals.GPIO6);
    let gpi = Gpi::new(entry, exit, light);

    // Seven segment display a..g, common cathode
    let segments = [
        Output::new(peripherals.GPIO10, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO11, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO18, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO19, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO20, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO21, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO22, Level::Low, OutputConfig::default()),
    ];
    let dp = Output::new(peripherals.GPIO23, Level::Low, OutputConfig::default());

    // Space indicators 1..3
    let indicators = [
        Output::new(peripherals.GPIO1, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO3, Level::Low, OutputConfig::default()),
    ];

    let servo = match board::servo_pwm(peripherals.LEDC, peripherals.GPIO7) {
        Ok(pwm) => pwm,
        Err(e) => panic!("{}", e),
    };
    let gpo = Gpo::new(
        Servo::new(servo),
        SevenSegment::new(segments, dp),
        indicators,
        settings.gate_open_angle(),
        settings.gate_closed_angle(),
    );

    // Without Wi-Fi the gate still works from the buttons
    if let Err(e) = net::start(
        &spawner,
        peripherals.WIFI,
        WIFI_SSID,
        WIFI_PASSWORD,
        settings.port(),
        settings.read_timeout(),
    ) {
        println!("command server disabled: {}", e);
    }

    let mut scheduler = Scheduler::new(settings, gpi, gpo, ChannelLink, Delay);
    scheduler.boot().await;
    scheduler.run().await
}

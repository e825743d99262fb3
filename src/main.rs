//! Autosampler firmware entry point.
//!
//! Hexagonal architecture with two threads sharing one orchestrator state.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BleMessenger   UartLink x2    GpioRelay     RtcClock          │
//! │  (MessagePort)  (DeviceLink)   (RelayPort)   (ClockPort)       │
//! │  FsFileStore    FileService    SupplyMonitor SystemControl     │
//! │  (FileStore)    (FileService)  (PowerPort)   (SystemPort)      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌──────────────────────┐        ┌─────────────────────────┐   │
//! │  │ decoder thread       │        │ scheduler (main task)   │   │
//! │  │ INBOX → Decoder      │──state─│ FSM → Sequencer → UARTs │   │
//! │  └──────────────────────┘        └─────────────────────────┘   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Result, anyhow};
use log::{info, warn};

use autosampler::adapters::ble::BleMessenger;
use autosampler::adapters::clock::RtcClock;
use autosampler::adapters::files::{FsFileStore, SPIFFS_BASE_PATH};
use autosampler::adapters::power::SupplyMonitor;
use autosampler::adapters::relay::GpioRelay;
use autosampler::adapters::system::SystemControl;
use autosampler::adapters::time::MonotonicTime;
use autosampler::adapters::uart::UartLink;
use autosampler::adapters::wifi::FileService;
use autosampler::app::ports::{ClockPort, Ports};
use autosampler::app::state::OrchestratorState;
use autosampler::config::SystemConfig;
use autosampler::drivers::{DeviceDriver, LinkSettings};
use autosampler::events::INBOX;
use autosampler::pins;
use autosampler::protocol::CommandDecoder;
use autosampler::scheduler::ScheduleEngine;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::PinDriver;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

const BLE_DEVICE_NAME: &str = "Autosampler";
const DECODER_STACK_BYTES: usize = 16 * 1024;

fn decoder_task(ports: Ports<'_>, state: &OrchestratorState, config: &SystemConfig) {
    CommandDecoder::new(ports, state, config).run(&INBOX)
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Autosampler v{}                  ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── 2. Storage and configuration ──────────────────────────
    let files = FsFileStore::mount_spiffs().map_err(|e| anyhow!("SPIFFS mount failed: {e}"))?;
    let config = SystemConfig::load_or_default(&files);

    // ── 3. Adapters ───────────────────────────────────────────
    let clock = RtcClock::new();
    let time = MonotonicTime::new();
    let system = SystemControl::default();

    info!("Relay on GPIO {}", pins::RELAY_GPIO);
    let relay = GpioRelay::new(PinDriver::output(peripherals.pins.gpio13)?);

    info!(
        "Pump UART tx={} rx={}, actuator UART tx={} rx={}",
        pins::PUMP_UART_TX_GPIO,
        pins::PUMP_UART_RX_GPIO,
        pins::ACTUATOR_UART_TX_GPIO,
        pins::ACTUATOR_UART_RX_GPIO
    );
    let pump_link = UartLink::new(
        "PUMP",
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
    )
    .map_err(|e| anyhow!("pump UART: {e}"))?;
    let actuator_link = UartLink::new(
        "ACTUATOR",
        peripherals.uart2,
        peripherals.pins.gpio4,
        peripherals.pins.gpio5,
    )
    .map_err(|e| anyhow!("actuator UART: {e}"))?;

    let power = SupplyMonitor::new(pins::SUPPLY_ADC_CHANNEL)
        .ok_or_else(|| anyhow!("supply ADC init failed"))?;

    let file_service = FileService::new(SPIFFS_BASE_PATH, peripherals.modem, sysloop, Some(nvs))
        .map_err(|e| anyhow!("file service: {e}"))?;

    let ble = BleMessenger::new(BLE_DEVICE_NAME);
    if let Err(e) = ble.start() {
        // The idle heartbeat retries once the rail is high enough.
        warn!("BLE start failed ({}), continuing offline", e);
    }

    // ── 4. Domain wiring ──────────────────────────────────────
    let state = OrchestratorState::new();
    let devices = DeviceDriver::new(
        &pump_link,
        &actuator_link,
        &time,
        &clock,
        &files,
        &state.faults,
        LinkSettings::from(&config),
    );
    let ports = Ports {
        clock: &clock,
        time: &time,
        messages: &ble,
        relay: &relay,
        files: &files,
        system: &system,
        power: &power,
        file_service: &file_service,
        devices: &devices,
    };

    info!("RTC reads {}", clock.now());
    info!("System ready. Starting decoder and scheduler.");

    // ── 5. Threads ────────────────────────────────────────────
    std::thread::scope(|s| -> Result<()> {
        let (state, config) = (&state, &config);
        std::thread::Builder::new()
            .name("decoder".into())
            .stack_size(DECODER_STACK_BYTES)
            .spawn_scoped(s, move || decoder_task(ports, state, config))?;
        ScheduleEngine::new(ports, state, config).run()
    })
}

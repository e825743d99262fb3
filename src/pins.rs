//! GPIO / peripheral pin assignments for the autosampler controller board
//! (ESP32-S3).
//!
//! Single source of truth for pin numbers.  `main` takes the matching
//! typed pins from `Peripherals`; keep both in step when rewiring.

// ---------------------------------------------------------------------------
// Power relay (pump + valve controller supply)
// ---------------------------------------------------------------------------

/// Digital output, active-low: LOW closes the relay.
pub const RELAY_GPIO: i32 = 13;

// ---------------------------------------------------------------------------
// Syringe pump controller (UART1, full duplex, 9600 8N1)
// ---------------------------------------------------------------------------

pub const PUMP_UART_TX_GPIO: i32 = 17;
pub const PUMP_UART_RX_GPIO: i32 = 18;

// ---------------------------------------------------------------------------
// Valve actuator controller (UART2, full duplex, 9600 8N1)
// ---------------------------------------------------------------------------

pub const ACTUATOR_UART_TX_GPIO: i32 = 4;
pub const ACTUATOR_UART_RX_GPIO: i32 = 5;

// ---------------------------------------------------------------------------
// Supply monitor (ADC1)
// ---------------------------------------------------------------------------

/// Rail divider tap, GPIO 1.
pub const SUPPLY_ADC_GPIO: i32 = 1;
/// ADC1 channel of [`SUPPLY_ADC_GPIO`] on the S3.
pub const SUPPLY_ADC_CHANNEL: u32 = 0;

/// Every GPIO claimed above.
pub const ALL_GPIOS: [i32; 6] = [
    RELAY_GPIO,
    PUMP_UART_TX_GPIO,
    PUMP_UART_RX_GPIO,
    ACTUATOR_UART_TX_GPIO,
    ACTUATOR_UART_RX_GPIO,
    SUPPLY_ADC_GPIO,
];

//! Concrete implementations of the port traits.
//!
//! | Adapter  | Implements        | Connects to                    |
//! |----------|-------------------|--------------------------------|
//! | `ble`    | MessagePort       | Bluedroid GATT server          |
//! | `clock`  | ClockPort         | ESP32 RTC / host clock         |
//! | `files`  | FileStore         | SPIFFS via VFS / host dir      |
//! | `power`  | PowerPort         | ADC1 supply divider            |
//! | `relay`  | RelayPort         | GPIO (embedded-hal pin)        |
//! | `system` | SystemPort        | esp_restart / deep sleep       |
//! | `time`   | TimePort          | ESP32 system timer             |
//! | `uart`   | DeviceLink        | UART0 / UART1, or simulation   |
//! | `wifi`   | FileServicePort   | soft AP + HTTP file server     |

pub mod ble;
pub mod clock;
pub mod files;
pub mod power;
pub mod relay;
pub mod system;
pub mod time;
pub mod uart;
pub(super) mod utils;
pub mod wifi;

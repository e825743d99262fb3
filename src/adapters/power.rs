//! Supply rail monitor.
//!
//! Implements [`PowerPort`].  The rail feeds the ADC through a 3:1
//! divider.
//!
//! - **`target_os = "espidf"`**: one-shot ADC read via `adc_oneshot_*`.
//! - **all other targets**: a settable fixed voltage.

use core::sync::atomic::{AtomicU32, Ordering};

use log::info;

use crate::app::ports::PowerPort;

/// Divider ratio between the rail and the ADC pin.
pub const DIVIDER_RATIO: f32 = 3.0;
/// Full-scale ADC input voltage at 12 dB attenuation.
pub const ADC_FULL_SCALE: f32 = 3.3;
const ADC_MAX_COUNT: f32 = 4095.0;

/// Convert a 12-bit ADC count to rail volts.
pub fn counts_to_volts(raw: u16) -> f32 {
    f32::from(raw.min(4095)) / ADC_MAX_COUNT * ADC_FULL_SCALE * DIVIDER_RATIO
}

#[cfg(target_os = "espidf")]
struct AdcUnit(esp_idf_svc::sys::adc_oneshot_unit_handle_t);

// SAFETY: the oneshot driver handle is only used behind the `Mutex`.
#[cfg(target_os = "espidf")]
unsafe impl Send for AdcUnit {}

pub struct SupplyMonitor {
    #[cfg(target_os = "espidf")]
    unit: std::sync::Mutex<AdcUnit>,
    #[cfg(target_os = "espidf")]
    channel: esp_idf_svc::sys::adc_channel_t,
    /// Last reading (sim: the configured voltage), as `f32` bits.
    last_volts: AtomicU32,
}

impl SupplyMonitor {
    /// Claim ADC1 `channel` for rail readings.
    #[cfg(target_os = "espidf")]
    pub fn new(channel: esp_idf_svc::sys::adc_channel_t) -> Option<Self> {
        use esp_idf_svc::sys::*;

        let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
        let unit_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            ..unsafe { core::mem::zeroed() }
        };
        // SAFETY: valid config and out-pointer.
        if unsafe { adc_oneshot_new_unit(&unit_cfg, &mut handle) } != ESP_OK as esp_err_t {
            log::error!("Power: ADC unit init failed");
            return None;
        }
        let chan_cfg = adc_oneshot_chan_cfg_t {
            atten: adc_atten_t_ADC_ATTEN_DB_12,
            bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        // SAFETY: `handle` was just created.
        if unsafe { adc_oneshot_config_channel(handle, channel, &chan_cfg) } != ESP_OK as esp_err_t {
            log::error!("Power: ADC channel {} config failed", channel);
            return None;
        }
        info!("Power: monitoring ADC1 channel {}", channel);
        Some(Self {
            unit: std::sync::Mutex::new(AdcUnit(handle)),
            channel,
            last_volts: AtomicU32::new(0),
        })
    }

    /// Simulated rail at `volts`.
    #[cfg(not(target_os = "espidf"))]
    pub fn new(volts: f32) -> Self {
        info!("Power(sim): rail fixed at {:.2} V", volts);
        Self {
            last_volts: AtomicU32::new(volts.to_bits()),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn set_voltage(&self, volts: f32) {
        self.last_volts.store(volts.to_bits(), Ordering::Relaxed);
    }

    /// Most recent reading.
    pub fn last_voltage(&self) -> f32 {
        f32::from_bits(self.last_volts.load(Ordering::Relaxed))
    }

    #[cfg(target_os = "espidf")]
    fn platform_read(&self) -> Option<f32> {
        let unit = self
            .unit
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut raw: i32 = 0;
        // SAFETY: handle owned by `self`, valid out-pointer.
        let ret = unsafe { esp_idf_svc::sys::adc_oneshot_read(unit.0, self.channel, &mut raw) };
        if ret != esp_idf_svc::sys::ESP_OK as esp_idf_svc::sys::esp_err_t {
            return None;
        }
        let volts = counts_to_volts(u16::try_from(raw).ok()?);
        self.last_volts.store(volts.to_bits(), Ordering::Relaxed);
        Some(volts)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_read(&self) -> Option<f32> {
        let v = self.last_voltage();
        v.is_finite().then_some(v)
    }
}

impl PowerPort for SupplyMonitor {
    fn supply_voltage(&self) -> Option<f32> {
        self.platform_read()
    }
}

//! BLE text channel adapter.
//!
//! Implements [`MessagePort`] over a UART-style GATT service: the operator
//! writes command frames to the RX characteristic and receives status
//! frames as TX notifications.  Every RX write is pushed straight into
//! [`crate::events::INBOX`]; the decoder thread drains it.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via raw `esp_idf_svc::sys` calls.
//! - **all other targets**: simulation backend that records notifications.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                          | Perms        |
//! |----------------|-------------------------------|--------------|
//! | Service        | `6e400001-…-e50e24dcca9e`     |              |
//! | RX (commands)  | `6e400002-…-e50e24dcca9e`     | Write        |
//! | TX (status)    | `6e400003-…-e50e24dcca9e`     | Notify       |
//!
//! Frames longer than one notification are split at character boundaries
//! into MTU-sized chunks.

use core::sync::atomic::{AtomicU8, Ordering};

use log::{info, warn};

use crate::app::ports::{MessagePort, TransportError};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e;
pub const CHAR_RX: u128 = 0x6e40_0002_b5a3_f393_e0a9_e50e_24dc_ca9e;
pub const CHAR_TX: u128 = 0x6e40_0003_b5a3_f393_e0a9_e50e_24dc_ca9e;

/// ATT MTU requested from the central.
pub const REQUESTED_MTU: u16 = 200;
/// MTU before any exchange.
pub const DEFAULT_MTU: u16 = 23;
const ATT_HEADER_LEN: usize = 3;
const MAX_NAME_LEN: usize = 24;

// ───────────────────────────────────────────────────────────────
// Stack state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BleState {
    Idle = 0,
    Advertising = 1,
    Connected = 2,
    Failed = 3,
}

impl BleState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Advertising,
            2 => Self::Connected,
            3 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Framing helpers
// ───────────────────────────────────────────────────────────────

/// Notification payload size for an ATT MTU.
pub fn chunk_len(mtu: u16) -> usize {
    usize::from(mtu.max(DEFAULT_MTU)) - ATT_HEADER_LEN
}

/// Split `text` into pieces of at most `max` bytes without cutting a
/// UTF-8 sequence.
pub fn split_frame(text: &str, max: usize) -> Vec<&str> {
    let max = max.max(4);
    let mut chunks = Vec::with_capacity(text.len() / max + 1);
    let mut rest = text;
    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}

/// Hand an RX write to the decoder.  Runs in the Bluedroid task.
fn on_rx_write(data: &[u8]) -> bool {
    crate::events::INBOX.push(data)
}

// ── Bluedroid backend ─────────────────────────────────────────
//
// Bluedroid calls back through bare C function pointers, so the link
// state the callbacks fill in lives in one static.

#[cfg(target_os = "espidf")]
mod bluedroid {
    use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, Ordering};

    use esp_idf_svc::sys::*;

    use super::{CHAR_RX, CHAR_TX, DEFAULT_MTU, REQUESTED_MTU, SERVICE_UUID, on_rx_write};
    use crate::app::ports::TransportError;

    const CCCD_UUID: u16 = 0x2902;
    const SERVICE_HANDLES: u16 = 8;

    /// Which attribute the next ADD_CHAR/ADD_CHAR_DESCR event belongs to.
    const STAGE_RX: u8 = 1;
    const STAGE_TX: u8 = 2;
    const STAGE_CCCD: u8 = 3;

    struct Link {
        gatts_if: AtomicU8,
        conn_id: AtomicU16,
        connected: AtomicBool,
        mtu: AtomicU16,
        service: AtomicU16,
        rx: AtomicU16,
        tx: AtomicU16,
        stage: AtomicU8,
    }

    static LINK: Link = Link {
        gatts_if: AtomicU8::new(0),
        conn_id: AtomicU16::new(0),
        connected: AtomicBool::new(false),
        mtu: AtomicU16::new(DEFAULT_MTU),
        service: AtomicU16::new(0),
        rx: AtomicU16::new(0),
        tx: AtomicU16::new(0),
        stage: AtomicU8::new(0),
    };

    fn check(ret: esp_err_t, what: &str) -> Result<(), TransportError> {
        if ret == ESP_OK as esp_err_t {
            Ok(())
        } else {
            log::error!("BLE: {what} failed ({ret})");
            Err(TransportError::InitFailed)
        }
    }

    fn uuid128(uuid: u128) -> esp_bt_uuid_t {
        // SAFETY: plain C struct, all-zero is a valid value.
        let mut id: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        id.len = 16;
        id.uuid.uuid128 = uuid.to_le_bytes();
        id
    }

    fn uuid16(uuid: u16) -> esp_bt_uuid_t {
        // SAFETY: as above.
        let mut id: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        id.len = 2;
        id.uuid.uuid16 = uuid;
        id
    }

    fn advertise() {
        let mut params = esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            // SAFETY: remaining fields are plain integers.
            ..unsafe { core::mem::zeroed() }
        };
        // SAFETY: params outlives the call; Bluedroid copies it.
        unsafe {
            esp_ble_gap_start_advertising(&mut params);
        }
    }

    fn add_characteristic(service: u16, uuid: u128, perm: u32, prop: u32) {
        let mut id = uuid128(uuid);
        // SAFETY: null value/control pointers let the stack own storage.
        unsafe {
            esp_ble_gatts_add_char(
                service,
                &mut id,
                perm as esp_gatt_perm_t,
                prop as esp_gatt_char_prop_t,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    pub(super) fn bring_up(name: &str) -> Result<(), TransportError> {
        let name = std::ffi::CString::new(name).map_err(|_| TransportError::InitFailed)?;
        // SAFETY: called from one thread; Bluedroid serialises its callbacks.
        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);
            let mut controller = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut controller), "controller init")?;
            check(esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE), "controller enable")?;
            check(esp_bluedroid_init(), "bluedroid init")?;
            check(esp_bluedroid_enable(), "bluedroid enable")?;

            esp_ble_gap_register_callback(Some(on_gap_event));
            esp_ble_gatts_register_callback(Some(on_gatts_event));
            esp_ble_gatts_app_register(0);
            esp_ble_gatt_set_local_mtu(REQUESTED_MTU);
            esp_ble_gap_set_device_name(name.as_ptr());

            // Advertising starts from the DATA_SET_COMPLETE event.
            let mut adv: esp_ble_adv_data_t = core::mem::zeroed();
            adv.include_name = true;
            adv.flag = (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8;
            esp_ble_gap_config_adv_data(&mut adv);
        }
        Ok(())
    }

    pub(super) fn tear_down() {
        LINK.connected.store(false, Ordering::Release);
        LINK.tx.store(0, Ordering::Relaxed);
        // SAFETY: reverse of bring_up; each call tolerates a stopped stack.
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
    }

    pub(super) fn connected() -> bool {
        LINK.connected.load(Ordering::Acquire)
    }

    pub(super) fn mtu() -> u16 {
        LINK.mtu.load(Ordering::Relaxed)
    }

    pub(super) fn notify(chunk: &[u8]) -> Result<(), TransportError> {
        let tx = LINK.tx.load(Ordering::Relaxed);
        if tx == 0 {
            return Err(TransportError::NotConnected);
        }
        // SAFETY: the stack copies `chunk` before returning.
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                LINK.gatts_if.load(Ordering::Relaxed),
                LINK.conn_id.load(Ordering::Relaxed),
                tx,
                chunk.len() as u16,
                chunk.as_ptr().cast_mut(),
                false,
            )
        };
        if ret == ESP_OK as esp_err_t {
            Ok(())
        } else {
            Err(TransportError::SendFailed)
        }
    }

    unsafe extern "C" fn on_gap_event(
        event: esp_gap_ble_cb_event_t,
        _param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => advertise(),
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                log::info!("BLE: advertising");
            }
            _ => {}
        }
    }

    unsafe extern "C" fn on_gatts_event(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        LINK.gatts_if.store(gatts_if, Ordering::Relaxed);
        // SAFETY: Bluedroid passes a valid parameter union for `event`.
        let param = unsafe { &*param };

        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => register_service(gatts_if),
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                // SAFETY: `create` is the active variant for CREATE_EVT.
                let service = unsafe { param.create.service_handle };
                LINK.service.store(service, Ordering::Relaxed);
                LINK.stage.store(STAGE_RX, Ordering::Relaxed);
                // SAFETY: handle just returned by the stack.
                unsafe {
                    esp_ble_gatts_start_service(service);
                }
                add_characteristic(
                    service,
                    CHAR_RX,
                    ESP_GATT_PERM_WRITE,
                    ESP_GATT_CHAR_PROP_BIT_WRITE | ESP_GATT_CHAR_PROP_BIT_WRITE_NR,
                );
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                // SAFETY: `add_char` is the active variant.
                attribute_added(unsafe { param.add_char.attr_handle });
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
                log::info!("BLE: UART service ready");
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                // SAFETY: `connect` is the active variant.
                let conn_id = unsafe { param.connect.conn_id };
                LINK.conn_id.store(conn_id, Ordering::Relaxed);
                LINK.connected.store(true, Ordering::Release);
                log::info!("BLE: central connected ({conn_id})");
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                LINK.connected.store(false, Ordering::Release);
                LINK.mtu.store(DEFAULT_MTU, Ordering::Relaxed);
                log::info!("BLE: central disconnected");
                advertise();
            }
            esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
                // SAFETY: `mtu` is the active variant.
                let mtu = unsafe { param.mtu.mtu };
                LINK.mtu.store(mtu, Ordering::Relaxed);
                log::debug!("BLE: MTU {mtu}");
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                // SAFETY: `write` is the active variant.
                handle_write(gatts_if, unsafe { &param.write });
            }
            _ => {}
        }
    }

    fn register_service(gatts_if: esp_gatt_if_t) {
        let mut service = esp_gatt_srvc_id_t {
            id: esp_gatt_id_t {
                uuid: uuid128(SERVICE_UUID),
                inst_id: 0,
            },
            is_primary: true,
        };
        // SAFETY: `service` is copied by the stack.
        unsafe {
            esp_ble_gatts_create_service(gatts_if, &mut service, SERVICE_HANDLES);
        }
    }

    fn attribute_added(handle: u16) {
        let service = LINK.service.load(Ordering::Relaxed);
        match LINK.stage.load(Ordering::Relaxed) {
            STAGE_RX => {
                LINK.rx.store(handle, Ordering::Relaxed);
                LINK.stage.store(STAGE_TX, Ordering::Relaxed);
                add_characteristic(service, CHAR_TX, ESP_GATT_PERM_READ, ESP_GATT_CHAR_PROP_BIT_NOTIFY);
            }
            STAGE_TX => {
                LINK.tx.store(handle, Ordering::Relaxed);
                LINK.stage.store(STAGE_CCCD, Ordering::Relaxed);
                let mut cccd = uuid16(CCCD_UUID);
                // SAFETY: as in add_characteristic.
                unsafe {
                    esp_ble_gatts_add_char_descr(
                        service,
                        &mut cccd,
                        (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                        core::ptr::null_mut(),
                        core::ptr::null_mut(),
                    );
                }
            }
            _ => {}
        }
    }

    fn handle_write(gatts_if: esp_gatt_if_t, write: &esp_ble_gatts_cb_param_t_gatts_write_evt_param) {
        if write.handle == LINK.rx.load(Ordering::Relaxed) && !write.is_prep {
            // SAFETY: value/len describe the stack's buffer for this event.
            let data = unsafe { core::slice::from_raw_parts(write.value, usize::from(write.len)) };
            if !on_rx_write(data) {
                log::warn!("BLE: inbox full, frame dropped");
            }
        }
        if write.need_rsp {
            // SAFETY: ids echo the request being answered.
            unsafe {
                esp_ble_gatts_send_response(
                    gatts_if,
                    write.conn_id,
                    write.trans_id,
                    esp_gatt_status_t_ESP_GATT_OK,
                    core::ptr::null_mut(),
                );
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BLE messenger
// ───────────────────────────────────────────────────────────────

pub struct BleMessenger {
    state: AtomicU8,
    device_name: heapless::String<MAX_NAME_LEN>,
    #[cfg(not(target_os = "espidf"))]
    sim: std::sync::Mutex<SimLink>,
}

/// Simulated central: connection flag, negotiated MTU and every
/// notification the adapter sent.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug)]
struct SimLink {
    connected: bool,
    mtu: u16,
    notifications: Vec<String>,
}

impl BleMessenger {
    pub fn new(device_name: &str) -> Self {
        let mut name = heapless::String::new();
        for c in device_name.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        Self {
            state: AtomicU8::new(BleState::Idle as u8),
            device_name: name,
            #[cfg(not(target_os = "espidf"))]
            sim: std::sync::Mutex::new(SimLink {
                connected: false,
                mtu: DEFAULT_MTU,
                notifications: Vec::new(),
            }),
        }
    }

    pub fn state(&self) -> BleState {
        if self.platform_connected() {
            return BleState::Connected;
        }
        BleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: BleState) {
        self.state.store(s as u8, Ordering::Release);
    }

    /// Bring the stack up and start advertising.
    pub fn start(&self) -> Result<(), TransportError> {
        info!("BLE: starting advertising as '{}'", self.device_name);
        match self.platform_start() {
            Ok(()) => {
                self.set_state(BleState::Advertising);
                Ok(())
            }
            Err(e) => {
                self.set_state(BleState::Failed);
                Err(e)
            }
        }
    }

    pub fn stop(&self) {
        self.platform_stop();
        self.set_state(BleState::Idle);
        info!("BLE: stopped");
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&self) -> Result<(), TransportError> {
        bluedroid::bring_up(&self.device_name)?;
        info!("BLE(espidf): Bluedroid stack initialized");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&self) -> Result<(), TransportError> {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&self) {
        bluedroid::tear_down();
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&self) {
        self.sim_guard().connected = false;
        info!("BLE(sim): stopped");
    }

    #[cfg(target_os = "espidf")]
    fn platform_connected(&self) -> bool {
        bluedroid::connected()
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connected(&self) -> bool {
        self.sim_guard().connected
    }

    #[cfg(target_os = "espidf")]
    fn platform_mtu(&self) -> u16 {
        bluedroid::mtu()
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_mtu(&self) -> u16 {
        self.sim_guard().mtu
    }

    #[cfg(target_os = "espidf")]
    fn platform_notify(&self, chunk: &[u8]) -> Result<(), TransportError> {
        bluedroid::notify(chunk)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&self, chunk: &[u8]) -> Result<(), TransportError> {
        self.sim_guard()
            .notifications
            .push(String::from_utf8_lossy(chunk).into_owned());
        Ok(())
    }

    // ── Simulation hooks ──────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn sim_guard(&self) -> std::sync::MutexGuard<'_, SimLink> {
        self.sim
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Simulate a central connecting and negotiating `mtu`.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_connect(&self, mtu: u16) {
        let mut sim = self.sim_guard();
        sim.connected = true;
        sim.mtu = mtu;
        info!("BLE(sim): central connected (MTU {})", mtu);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_disconnect(&self) {
        let mut sim = self.sim_guard();
        sim.connected = false;
        sim.mtu = DEFAULT_MTU;
    }

    /// Simulate the central writing `data` to RX.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_write(&self, data: &[u8]) -> bool {
        on_rx_write(data)
    }

    /// Drain the recorded notifications.
    #[cfg(not(target_os = "espidf"))]
    pub fn take_notifications(&self) -> Vec<String> {
        core::mem::take(&mut self.sim_guard().notifications)
    }
}

// ───────────────────────────────────────────────────────────────
// MessagePort implementation
// ───────────────────────────────────────────────────────────────

impl MessagePort for BleMessenger {
    fn send(&self, text: &str) -> Result<(), TransportError> {
        if !self.platform_connected() {
            return Err(TransportError::NotConnected);
        }
        for chunk in split_frame(text, chunk_len(self.platform_mtu())) {
            self.platform_notify(chunk.as_bytes())?;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        matches!(self.state(), BleState::Advertising | BleState::Connected)
    }

    fn restart(&self) -> Result<(), TransportError> {
        warn!("BLE: restarting stack");
        if self.state() != BleState::Idle {
            self.platform_stop();
        }
        self.start()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

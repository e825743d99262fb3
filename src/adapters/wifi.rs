//! Wi-Fi file-transfer service adapter.
//!
//! Implements [`FileServicePort`]: a soft access point plus a small HTTP
//! server that lists and serves the files of the data partition, so an
//! operator can pull logs without the radio channel.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi` AP mode and
//!   `esp_idf_svc::http::server`.
//! - **all other targets**: simulation that tracks the running handle.
//!
//! ## Routes
//!
//! | Path            | Response                          |
//! |-----------------|-----------------------------------|
//! | `GET /`         | HTML index of the data partition  |
//! | `GET /files/*`  | raw file contents                 |

use core::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use super::utils::{is_plain_file_name, validate_ap_credentials};
use crate::app::ports::{FileServiceError, FileServiceHandle, FileServicePort, FileServiceStatus};

/// Soft-AP gateway address.
pub const AP_IP: &str = "192.168.4.1";
const AP_CHANNEL: u8 = 1;
const AP_MAX_CONNECTIONS: u16 = 4;

// ───────────────────────────────────────────────────────────────
// Listing helpers
// ───────────────────────────────────────────────────────────────

/// Plain files directly under `root`, sorted by name, with sizes.
pub fn list_files(root: &Path) -> Vec<(String, u64)> {
    let Ok(dir) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut entries: Vec<(String, u64)> = dir
        .filter_map(Result::ok)
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            Some((e.file_name().to_string_lossy().into_owned(), meta.len()))
        })
        .collect();
    entries.sort();
    entries
}

pub fn index_page(entries: &[(String, u64)]) -> String {
    let mut page = String::from("<html><body><h1>Autosampler files</h1><ul>");
    for (name, size) in entries {
        let _ = write!(page, "<li><a href=\"/files/{name}\">{name}</a> ({size} bytes)</li>");
    }
    page.push_str("</ul></body></html>");
    page
}

/// File name from a `/files/<name>` URI, query string ignored.
pub fn requested_file(uri: &str) -> Option<&str> {
    let path = uri.split('?').next()?;
    let name = path.strip_prefix("/files/")?;
    is_plain_file_name(name).then_some(name)
}

fn copy_str<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

// ───────────────────────────────────────────────────────────────
// File service
// ───────────────────────────────────────────────────────────────

pub struct FileService {
    root: PathBuf,
    running: Mutex<Option<FileServiceHandle>>,
    #[cfg(target_os = "espidf")]
    platform: Mutex<EspPlatform>,
}

#[cfg(target_os = "espidf")]
struct EspPlatform {
    wifi: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    server: Option<esp_idf_svc::http::server::EspHttpServer<'static>>,
}

impl FileService {
    #[cfg(target_os = "espidf")]
    pub fn new(
        root: impl Into<PathBuf>,
        modem: esp_idf_hal::modem::Modem,
        sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
        nvs: Option<esp_idf_svc::nvs::EspDefaultNvsPartition>,
    ) -> Result<Self, FileServiceError> {
        use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs).map_err(|e| {
            log::error!("WiFi: driver init failed ({})", e);
            FileServiceError::StartFailed
        })?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop).map_err(|e| {
            log::error!("WiFi: event loop wrap failed ({})", e);
            FileServiceError::StartFailed
        })?;
        Ok(Self {
            root: root.into(),
            running: Mutex::new(None),
            platform: Mutex::new(EspPlatform { wifi, server: None }),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<FileServiceHandle>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&self, ssid: &str, password: &str, port: u16) -> Result<(), FileServiceError> {
        use esp_idf_svc::http::Method;
        use esp_idf_svc::http::server::{Configuration as HttpConfig, EspHttpServer};
        use esp_idf_svc::io::Write;
        use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, Configuration};

        let mut platform = self.platform.lock().unwrap_or_else(PoisonError::into_inner);

        let ap = AccessPointConfiguration {
            ssid: copy_str(ssid),
            password: copy_str(password),
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            channel: AP_CHANNEL,
            max_connections: AP_MAX_CONNECTIONS,
            ..Default::default()
        };
        let started = platform
            .wifi
            .set_configuration(&Configuration::AccessPoint(ap))
            .and_then(|()| platform.wifi.start())
            .and_then(|()| platform.wifi.wait_netif_up());
        if let Err(e) = started {
            warn!("WiFi: AP start failed ({})", e);
            let _ = platform.wifi.stop();
            return Err(FileServiceError::StartFailed);
        }

        let http = HttpConfig {
            http_port: port,
            uri_match_wildcard: true,
            ..Default::default()
        };
        let mut server = EspHttpServer::new(&http).map_err(|e| {
            warn!("HTTP: server start failed ({})", e);
            FileServiceError::StartFailed
        })?;

        let index_root = self.root.clone();
        let files_root = self.root.clone();
        let routes = server
            .fn_handler("/", Method::Get, move |req| {
                let page = index_page(&list_files(&index_root));
                req.into_ok_response()?.write_all(page.as_bytes())
            })
            .and_then(|s| {
                s.fn_handler("/files/*", Method::Get, move |req| {
                    let body = requested_file(req.uri())
                        .and_then(|name| std::fs::read(files_root.join(name)).ok());
                    match body {
                        Some(bytes) => req.into_ok_response()?.write_all(&bytes),
                        None => req
                            .into_status_response(404)?
                            .write_all(b"file not found"),
                    }
                })
            });
        if let Err(e) = routes {
            warn!("HTTP: route registration failed ({})", e);
            return Err(FileServiceError::StartFailed);
        }
        platform.server = Some(server);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&self, ssid: &str, _password: &str, port: u16) -> Result<(), FileServiceError> {
        info!(
            "WiFi(sim): AP '{}' serving {} on port {}",
            ssid,
            self.root.display(),
            port
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&self) {
        let mut platform = self.platform.lock().unwrap_or_else(PoisonError::into_inner);
        platform.server = None;
        if let Err(e) = platform.wifi.stop() {
            warn!("WiFi: AP stop failed ({})", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&self) {
        info!("WiFi(sim): AP stopped");
    }

    #[cfg(target_os = "espidf")]
    fn platform_ip(&self) -> heapless::String<16> {
        let platform = self.platform.lock().unwrap_or_else(PoisonError::into_inner);
        match platform.wifi.wifi().ap_netif().get_ip_info() {
            Ok(info) => {
                let mut ip = heapless::String::new();
                let _ = write!(ip, "{}", info.ip);
                ip
            }
            Err(_) => copy_str(AP_IP),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_ip(&self) -> heapless::String<16> {
        copy_str(AP_IP)
    }
}

impl FileServicePort for FileService {
    fn start(
        &self,
        ssid: &str,
        password: &str,
        port: u16,
    ) -> Result<FileServiceHandle, FileServiceError> {
        validate_ap_credentials(ssid, password)?;
        let mut running = self.running();
        if running.is_some() {
            return Err(FileServiceError::AlreadyRunning);
        }
        self.platform_start(ssid, password, port)?;
        let handle = FileServiceHandle {
            ssid: copy_str(ssid),
            port,
        };
        *running = Some(handle.clone());
        info!("File service up: '{}' {}:{}", ssid, self.platform_ip(), port);
        Ok(handle)
    }

    fn status(&self) -> FileServiceStatus {
        match self.running().as_ref() {
            Some(handle) => FileServiceStatus {
                ip: self.platform_ip(),
                port: handle.port,
                ssid: handle.ssid.clone(),
                ap_active: true,
            },
            None => FileServiceStatus {
                ip: copy_str("0.0.0.0"),
                port: 0,
                ssid: heapless::String::new(),
                ap_active: false,
            },
        }
    }

    fn stop(&self, handle: &FileServiceHandle) {
        let mut running = self.running();
        if running.as_ref() != Some(handle) {
            warn!("File service: stop for unknown handle '{}'", handle.ssid);
            return;
        }
        self.platform_stop();
        *running = None;
        info!("File service stopped");
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

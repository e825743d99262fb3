//! Shared validation and path helpers for the adapter layer.

use crate::app::ports::FileServiceError;

const MAX_SSID_LEN: usize = 32;
const MIN_WPA2_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 64;

/// Returns `true` if every byte of `s` is in the printable ASCII range
/// `0x20..=0x7E`.
pub(super) fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// Access-point credentials: SSID of 1-32 printable bytes, password empty
/// (open network) or 8-64 bytes.
pub(super) fn validate_ap_credentials(ssid: &str, password: &str) -> Result<(), FileServiceError> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN || !is_printable_ascii(ssid) {
        return Err(FileServiceError::InvalidCredentials);
    }
    if !password.is_empty()
        && !(MIN_WPA2_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password.len())
    {
        return Err(FileServiceError::InvalidCredentials);
    }
    Ok(())
}

/// File names are flat: no separators, no parent references.
pub(super) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && is_printable_ascii(name)
}

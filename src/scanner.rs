/// BLE advertisement reports and the observations derived from them.
///
/// The radio driver hands over one [`AdvReport`] per received advertisement.
/// [`Observation::from_report`] decodes the payload once and keeps only what
/// filtering, deduplication and reporting need: the address, the local name,
/// the first 16-bit service UUID, the manufacturer ID and the whole payload as
/// uppercase hex.
use core::fmt::{self, Write};
use core::str::FromStr;

use heapless::String;

use crate::ad::{
    self, AD_TYPE_COMPLETE_NAME, AD_TYPE_COMPLETE_UUIDS_16, AD_TYPE_INCOMPLETE_UUIDS_16,
    AD_TYPE_MANUFACTURER_DATA, AD_TYPE_SHORT_NAME,
};
use crate::protocol::{HexString, MacString, NameString, UuidString};

/// Largest payload an observation keeps (extended advertising upper bound).
/// Longer buffers are clamped to this many bytes.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// A 48-bit device address, most significant byte first (display order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 6]);

impl Address {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Build from the little-endian byte order most HCI stacks report.
    pub fn from_le_bytes(mut bytes: [u8; 6]) -> Self {
        bytes.reverse();
        Self(bytes)
    }

    /// "AA:BB:CC:DD:EE:FF"
    pub fn to_mac_string(&self) -> MacString {
        let mut buf = MacString::new();
        let _ = write!(buf, "{self}");
        buf
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Returned when a string is not a colon-separated 6-octet address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseAddressError;

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected address of the form AA:BB:CC:DD:EE:FF")
    }
}

impl core::error::Error for ParseAddressError {}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.trim().split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(ParseAddressError)?;
            if part.len() != 2 {
                return Err(ParseAddressError);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseAddressError)?;
        }
        if parts.next().is_some() {
            return Err(ParseAddressError);
        }
        Ok(Self(bytes))
    }
}

/// One advertisement as delivered by the scan driver.
#[derive(Debug, Clone, Copy)]
pub struct AdvReport<'a> {
    pub address: Address,
    pub rssi: i8,
    pub payload: &'a [u8],
}

impl<'a> AdvReport<'a> {
    pub fn new(address: Address, rssi: i8, payload: &'a [u8]) -> Self {
        Self {
            address,
            rssi,
            payload,
        }
    }

    /// Payload clamped to [`MAX_PAYLOAD_LEN`].
    pub fn payload(&self) -> &'a [u8] {
        &self.payload[..self.payload.len().min(MAX_PAYLOAD_LEN)]
    }
}

/// Per-advertisement view of a device, built fresh for every report and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub address: Address,
    /// `address` rendered as uppercase colon-hex, the form address patterns
    /// are matched against
    pub mac: MacString,
    /// Last local name (shortened or complete) in the payload; never empty
    pub name: Option<NameString>,
    /// First 16-bit service UUID as four uppercase hex digits
    pub service_id: Option<UuidString>,
    /// Company ID from manufacturer specific data
    pub manufacturer_id: Option<u16>,
    pub rssi: i8,
    /// Whole payload as uppercase hex
    pub raw_hex: HexString,
}

impl Observation {
    /// Decode a report into an observation.
    ///
    /// AD types used:
    ///   0x02/0x03 = Incomplete/Complete list of 16-bit service UUIDs
    ///   0x08/0x09 = Shortened/Complete local name
    ///   0xFF      = Manufacturer specific data (first 2 bytes = company ID, little-endian)
    pub fn from_report(report: &AdvReport<'_>) -> Self {
        let payload = report.payload();

        let mut obs = Observation {
            address: report.address,
            mac: report.address.to_mac_string(),
            name: None,
            service_id: None,
            manufacturer_id: None,
            rssi: report.rssi,
            raw_hex: HexString::new(),
        };
        hex_encode(payload, &mut obs.raw_hex);

        for field in ad::decode(payload) {
            match field.ad_type {
                AD_TYPE_SHORT_NAME | AD_TYPE_COMPLETE_NAME => {
                    obs.name = decode_name(field.data);
                }
                AD_TYPE_INCOMPLETE_UUIDS_16 | AD_TYPE_COMPLETE_UUIDS_16 => {
                    if obs.service_id.is_none() && field.data.len() >= 2 {
                        let uuid = u16::from_le_bytes([field.data[0], field.data[1]]);
                        let mut id = UuidString::new();
                        let _ = write!(id, "{uuid:04X}");
                        obs.service_id = Some(id);
                    }
                }
                AD_TYPE_MANUFACTURER_DATA => {
                    if field.data.len() >= 2 {
                        obs.manufacturer_id =
                            Some(u16::from_le_bytes([field.data[0], field.data[1]]));
                    }
                }
                _ => {}
            }
        }

        obs
    }
}

/// Decode a local name. Valid UTF-8 is kept as is; otherwise ASCII bytes are
/// kept and everything else becomes '?'. Empty names decode to `None`.
fn decode_name(data: &[u8]) -> Option<NameString> {
    let mut name = NameString::new();
    match core::str::from_utf8(data) {
        Ok(s) => push_truncated(&mut name, s),
        Err(_) => {
            for &b in data {
                let c = if b.is_ascii() { b as char } else { '?' };
                if name.push(c).is_err() {
                    break;
                }
            }
        }
    }
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Push as much of `s` as fits, never splitting a character.
pub fn push_truncated<const N: usize>(out: &mut String<N>, s: &str) {
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
}

/// Append `data` to `out` as uppercase hex, stopping when `out` is full.
pub fn hex_encode<const N: usize>(data: &[u8], out: &mut String<N>) {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    for &b in data {
        if N - out.len() < 2 {
            break;
        }
        let _ = out.push(DIGITS[(b >> 4) as usize] as char);
        let _ = out.push(DIGITS[(b & 0x0F) as usize] as char);
    }
}

/// Parse hex text (whitespace between digits allowed) into bytes.
///
/// Returns `None` on a non-hex character, an odd digit count, or when the
/// output would exceed `N` bytes.
pub fn hex_decode<const N: usize>(text: &str) -> Option<heapless::Vec<u8, N>> {
    let mut out = heapless::Vec::new();
    let mut high: Option<u8> = None;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            continue;
        }
        let nibble = c.to_digit(16)? as u8;
        match high.take() {
            None => high = Some(nibble),
            Some(h) => out.push((h << 4) | nibble).ok()?,
        }
    }
    if high.is_some() {
        return None;
    }
    Some(out)
}

/// JSON message protocol between the engine and its host.
///
/// All messages are newline-delimited JSON (NDJSON).
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::ad::{AdStructures, MAX_TYPE_NAME_LEN};
use crate::cache::{Classification, Millis};
use crate::filter::{Hit, ListSummary, PATTERN_LEN};
use crate::scanner::MAX_PAYLOAD_LEN;

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// Maximum length of a device name in bytes
pub const MAX_NAME_LEN: usize = 64;

/// Maximum length for device name strings
pub type NameString = String<MAX_NAME_LEN>;

/// 16-bit service UUID as hex ("180F")
pub type UuidString = String<8>;

/// Hex text of a whole payload (two characters per byte, up to 255 bytes)
pub type HexString = String<510>;

/// Messages sent from the engine to the host
#[derive(Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// New or changed device that passed the filter
    #[serde(rename = "device")]
    Device {
        mac: &'a MacString,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<&'a NameString>,
        rssi: i8,
        /// First 16-bit service UUID, if advertised
        #[serde(skip_serializing_if = "Option::is_none")]
        uuid: Option<&'a UuidString>,
        /// Manufacturer company ID, if advertised
        #[serde(skip_serializing_if = "Option::is_none")]
        mfr: Option<u16>,
        /// Vendor behind `mfr`, when it is a well-known company ID
        #[serde(skip_serializing_if = "Option::is_none")]
        vendor: Option<&'static str>,
        /// "new" or "changed"
        status: Classification,
        /// Raw advertisement payload as hex
        adv: &'a HexString,
        /// Decoded AD structures
        ad: AdStructures<'a>,
        /// Filter pattern that let this device through, if any
        #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
        matched: Option<Hit>,
        /// Milliseconds when captured
        ts: Millis,
    },
    /// Session statistics
    #[serde(rename = "status")]
    Status {
        scanning: bool,
        /// Sessions started so far
        session: u32,
        /// Advertisements seen this session
        received: u32,
        /// Hidden by the filter
        filtered: u32,
        /// Suppressed as unchanged
        duplicates: u32,
        /// Reported as new or changed
        reported: u32,
        /// Distinct devices in the cache
        unique: u32,
        /// New devices not cached because the cache was full
        untracked: u32,
        /// Whether deduplication is on
        dedup: bool,
        /// Library version
        version: &'static str,
    },
    /// Filter list summary
    #[serde(rename = "filters")]
    Filters {
        allow: ListSummary,
        deny: ListSummary,
    },
    /// Command accepted
    #[serde(rename = "ack")]
    Ack { cmd: &'static str },
    /// Command refused
    #[serde(rename = "error")]
    Error {
        cmd: &'static str,
        reason: &'static str,
    },
}

/// Commands sent from the host.
///
/// Deserialized manually via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    /// Start a new scanning session (resets the device cache)
    Start,
    /// Stop scanning
    Stop,
    /// Request session statistics
    GetStatus,
    /// Request filter list summary
    GetFilters,
    /// Add an allow-list pattern
    Allow {
        kind: PatternKind,
        value: PatternValue,
    },
    /// Add a deny-list pattern
    Deny {
        kind: PatternKind,
        value: PatternValue,
    },
    ClearAllow,
    ClearDeny,
    /// Clear both lists
    ClearAll,
    /// Turn both lists off, keeping their patterns
    Disable,
    /// Turn non-empty lists back on
    Enable,
    /// Turn deduplication on or off
    SetDedup { enabled: bool },
}

pub use crate::filter::PatternKind;

/// Longest pattern text accepted off the wire. Larger than [`PATTERN_LEN`]
/// so that over-long patterns reach the filter and get an error reply.
pub const MAX_PATTERN_TEXT: usize = 2 * PATTERN_LEN;

/// Raw pattern text as received; validated by the filter
pub type PatternValue = String<MAX_PATTERN_TEXT>;

/// Wire format for host commands: flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`. Converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: String<16>,
    #[serde(default)]
    pub kind: Option<String<8>>,
    #[serde(default)]
    pub value: Option<PatternValue>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Wire format for one advertisement report from the scan driver.
#[derive(Deserialize)]
pub(crate) struct RawScanReport {
    pub mac: MacString,
    pub rssi: i8,
    /// Payload hex; room for whitespace between byte pairs
    pub adv: String<MAX_ADV_TEXT>,
    #[serde(default)]
    pub ts: Option<Millis>,
}

/// Longest accepted `adv` text: 255 bytes as "XX " triples
pub const MAX_ADV_TEXT: usize = 768;

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON of one decoded AD structure, data excluded:
/// `{"type":255,"name":"","data":""},` plus the type name.
const AD_JSON_LEN: usize = 33 + MAX_TYPE_NAME_LEN;

/// Maximum size of a serialized JSON message.
///
/// Sized for the largest device report: a full payload split into empty AD
/// structures, with its hex written twice (`adv` and the `data` fields).
/// Room is left for a name escaped as `\u00XX` byte by byte.
pub const MAX_MSG_LEN: usize =
    (MAX_PAYLOAD_LEN / 2) * AD_JSON_LEN + 4 * MAX_PAYLOAD_LEN + 6 * MAX_NAME_LEN + 512;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

/// Communication layer: NDJSON framing, host commands and scan-report input.
///
/// The engine streams reports, status and filter summaries as
/// newline-delimited JSON. The same line-based transport carries host
/// commands and, when replaying a capture, the advertisement reports
/// themselves.
use heapless::Vec;

use crate::cache::Millis;
use crate::engine::Engine;
use crate::filter::{ListKind, PatternKind};
use crate::protocol::{
    DeviceMessage, HostCommand, MsgBuffer, RawCommand, RawScanReport, MAX_MSG_LEN, VERSION,
};
use crate::scanner::{self, Address, AdvReport, MAX_PAYLOAD_LEN};

/// One advertisement parsed from an NDJSON line, owning its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub address: Address,
    pub rssi: i8,
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    /// Capture timestamp, if the line carried one
    pub ts: Option<Millis>,
}

impl ScanReport {
    pub fn as_adv_report(&self) -> AdvReport<'_> {
        AdvReport::new(self.address, self.rssi, &self.payload)
    }
}

/// What a command did, for the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Applied; acknowledge it
    Done(&'static str),
    /// Reply with session statistics
    Status,
    /// Reply with the filter summary
    Filters,
    /// Refused, with a reason
    Rejected {
        cmd: &'static str,
        reason: &'static str,
    },
}

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize into a fresh [`MsgBuffer`] trimmed to the message length.
pub fn encode_message(msg: &DeviceMessage) -> Option<MsgBuffer> {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok()?;
    let len = serialize_message(msg, &mut buf)?;
    buf.truncate(len);
    Some(buf)
}

/// Deserialize a HostCommand from a JSON byte slice.
///
/// Parses into a flat [`RawCommand`] struct first, then converts to the
/// typed enum. Returns `None` for unknown commands or missing fields.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    let trimmed = trim_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _): (RawCommand, _) = serde_json_core::from_slice(trimmed).ok()?;
    match raw.cmd.as_str() {
        "start" => Some(HostCommand::Start),
        "stop" => Some(HostCommand::Stop),
        "status" => Some(HostCommand::GetStatus),
        "filters" => Some(HostCommand::GetFilters),
        "allow" | "deny" => {
            let kind = PatternKind::parse(raw.kind.as_deref()?)?;
            let value = raw.value?;
            if raw.cmd.as_str() == "allow" {
                Some(HostCommand::Allow { kind, value })
            } else {
                Some(HostCommand::Deny { kind, value })
            }
        }
        "clear_allow" => Some(HostCommand::ClearAllow),
        "clear_deny" => Some(HostCommand::ClearDeny),
        "clear" => Some(HostCommand::ClearAll),
        "disable" => Some(HostCommand::Disable),
        "enable" => Some(HostCommand::Enable),
        "dedup" => Some(HostCommand::SetDedup {
            enabled: raw.enabled?,
        }),
        _ => None,
    }
}

/// Parse one advertisement report line:
/// `{"mac":"AA:BB:CC:DD:EE:FF","rssi":-60,"adv":"020106","ts":1000}`.
///
/// Returns `None` for malformed JSON, a bad address, non-hex payload text or
/// a payload longer than [`MAX_PAYLOAD_LEN`].
pub fn parse_scan_report(data: &[u8]) -> Option<ScanReport> {
    let trimmed = trim_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _): (RawScanReport, _) = serde_json_core::from_slice(trimmed).ok()?;
    let address = raw.mac.parse::<Address>().ok()?;
    let payload = scanner::hex_decode::<MAX_PAYLOAD_LEN>(&raw.adv)?;
    Some(ScanReport {
        address,
        rssi: raw.rssi,
        payload,
        ts: raw.ts,
    })
}

/// Process a received host command and update state accordingly.
pub fn handle_command(
    cmd: &HostCommand,
    engine: &mut Engine,
    scanning: &mut bool,
) -> CommandOutcome {
    match cmd {
        HostCommand::Start => {
            engine.start_session();
            *scanning = true;
            log::info!("Scanning started by host command");
            CommandOutcome::Done("start")
        }
        HostCommand::Stop => {
            *scanning = false;
            log::info!("Scanning stopped by host command");
            CommandOutcome::Done("stop")
        }
        HostCommand::GetStatus => CommandOutcome::Status,
        HostCommand::GetFilters => CommandOutcome::Filters,
        HostCommand::Allow { kind, value } => add_pattern(engine, ListKind::Allow, *kind, value),
        HostCommand::Deny { kind, value } => add_pattern(engine, ListKind::Deny, *kind, value),
        HostCommand::ClearAllow => {
            engine.filter_mut().clear_allow();
            CommandOutcome::Done("clear_allow")
        }
        HostCommand::ClearDeny => {
            engine.filter_mut().clear_deny();
            CommandOutcome::Done("clear_deny")
        }
        HostCommand::ClearAll => {
            engine.filter_mut().clear_all();
            CommandOutcome::Done("clear")
        }
        HostCommand::Disable => {
            engine.filter_mut().disable();
            CommandOutcome::Done("disable")
        }
        HostCommand::Enable => {
            engine.filter_mut().enable();
            CommandOutcome::Done("enable")
        }
        HostCommand::SetDedup { enabled } => {
            engine.set_dedup(*enabled);
            CommandOutcome::Done("dedup")
        }
    }
}

fn add_pattern(
    engine: &mut Engine,
    list: ListKind,
    kind: PatternKind,
    value: &str,
) -> CommandOutcome {
    match engine.filter_mut().add(list, kind, value) {
        Ok(()) => CommandOutcome::Done(list.as_str()),
        Err(e) => CommandOutcome::Rejected {
            cmd: list.as_str(),
            reason: e.as_str(),
        },
    }
}

/// Reply for a handled command.
pub fn reply_message(
    outcome: CommandOutcome,
    engine: &Engine,
    scanning: bool,
) -> DeviceMessage<'static> {
    match outcome {
        CommandOutcome::Done(cmd) => DeviceMessage::Ack { cmd },
        CommandOutcome::Status => status_message(engine, scanning),
        CommandOutcome::Filters => filters_message(engine),
        CommandOutcome::Rejected { cmd, reason } => DeviceMessage::Error { cmd, reason },
    }
}

/// Session statistics message.
pub fn status_message(engine: &Engine, scanning: bool) -> DeviceMessage<'static> {
    let stats = engine.stats();
    DeviceMessage::Status {
        scanning,
        session: stats.session,
        received: stats.received,
        filtered: stats.filtered,
        duplicates: stats.duplicates,
        reported: stats.reported,
        unique: engine.unique_devices() as u32,
        untracked: stats.untracked,
        dedup: engine.config().dedup,
        version: VERSION,
    }
}

/// Filter list summary message.
pub fn filters_message(engine: &Engine) -> DeviceMessage<'static> {
    let summary = engine.filter().summary();
    DeviceMessage::Filters {
        allow: summary.allow,
        deny: summary.deny,
    }
}

fn trim_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &data[start..end]
}

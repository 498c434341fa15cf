/// Allow/deny filter engine for BLE observations.
///
/// Two independent pattern lists, each holding address, name, service UUID
/// and raw payload patterns. Precedence is fixed: an active allow-list decides
/// alone (show only matches); otherwise an active deny-list hides matches;
/// otherwise everything is shown.
///
/// All matching is case-insensitive. Patterns are uppercased when added,
/// subjects when evaluated.
use core::fmt;

use heapless::{String, Vec};
use serde::Serialize;

use crate::protocol::{NameString, UuidString};
use crate::scanner::Observation;

/// Maximum length of a single pattern in bytes
pub const PATTERN_LEN: usize = 64;

/// Address patterns per list (the built-in deny list alone uses 75)
pub const MAX_ADDRESS_PATTERNS: usize = 128;

/// Name, UUID and payload patterns per list
pub const MAX_PATTERNS: usize = 32;

/// Length of a full colon-hex address; address patterns this long match
/// exactly, shorter ones match as a prefix.
pub const FULL_ADDRESS_LEN: usize = 17;

/// Length of a colon-hex OUI ("A4:CF:12")
pub const OUI_LEN: usize = 8;

/// Shortest accepted address prefix (one octet)
pub const MIN_ADDRESS_PATTERN_LEN: usize = 2;

pub type Pattern = String<PATTERN_LEN>;

/// Which of the two lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Allow,
    Deny,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Allow => "allow",
            ListKind::Deny => "deny",
        }
    }
}

/// Device attribute a pattern applies to.
///
/// `Oui` is an input convenience: the value is cut to its first 8 characters
/// and stored as an address prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Mac,
    Oui,
    Name,
    Uuid,
    Payload,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Mac => "mac",
            PatternKind::Oui => "oui",
            PatternKind::Name => "name",
            PatternKind::Uuid => "uuid",
            PatternKind::Payload => "payload",
        }
    }

    /// Parse a kind keyword, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        [
            PatternKind::Mac,
            PatternKind::Oui,
            PatternKind::Name,
            PatternKind::Uuid,
            PatternKind::Payload,
        ]
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

/// Whether a list takes part in evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Off,
    Active,
}

/// Why a pattern was refused. The lists are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternError {
    /// Nothing left after trimming
    Empty,
    /// Longer than [`PATTERN_LEN`]
    TooLong,
    /// Not hex digits and colons, shorter than one octet or longer than a
    /// full address (or an OUI shorter than "XX:XX:XX")
    InvalidAddress,
    /// Payload pattern with non-hex characters
    InvalidHex,
    /// No room left for this kind of pattern
    ListFull,
}

impl PatternError {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternError::Empty => "empty pattern",
            PatternError::TooLong => "pattern too long",
            PatternError::InvalidAddress => "invalid address pattern",
            PatternError::InvalidHex => "payload pattern must be hex",
            PatternError::ListFull => "pattern list full",
        }
    }
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for PatternError {}

/// One side of the filter.
///
/// The mode is derived rather than stored: a list is active only while it is
/// enabled *and* holds at least one pattern. Adding a pattern enables the
/// list, clearing it empties every collection.
#[derive(Debug, Clone)]
pub struct PatternList {
    enabled: bool,
    addresses: Vec<Pattern, MAX_ADDRESS_PATTERNS>,
    names: Vec<Pattern, MAX_PATTERNS>,
    uuids: Vec<Pattern, MAX_PATTERNS>,
    payloads: Vec<Pattern, MAX_PATTERNS>,
}

impl PatternList {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            addresses: Vec::new(),
            names: Vec::new(),
            uuids: Vec::new(),
            payloads: Vec::new(),
        }
    }

    pub fn mode(&self) -> ListMode {
        if self.enabled && !self.is_empty() {
            ListMode::Active
        } else {
            ListMode::Off
        }
    }

    pub fn is_active(&self) -> bool {
        self.mode() == ListMode::Active
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
            && self.names.is_empty()
            && self.uuids.is_empty()
            && self.payloads.is_empty()
    }

    /// Patterns stored for `kind` (`Oui` shares the address collection).
    pub fn patterns(&self, kind: PatternKind) -> &[Pattern] {
        match kind {
            PatternKind::Mac | PatternKind::Oui => &self.addresses,
            PatternKind::Name => &self.names,
            PatternKind::Uuid => &self.uuids,
            PatternKind::Payload => &self.payloads,
        }
    }

    /// Validate, normalize and append a pattern; enables the list.
    pub fn add(&mut self, kind: PatternKind, value: &str) -> Result<(), PatternError> {
        let pattern = normalize(kind, value)?;
        let pushed = match kind {
            PatternKind::Mac | PatternKind::Oui => self.addresses.push(pattern),
            PatternKind::Name => self.names.push(pattern),
            PatternKind::Uuid => self.uuids.push(pattern),
            PatternKind::Payload => self.payloads.push(pattern),
        };
        pushed.map_err(|_| PatternError::ListFull)?;
        self.enabled = true;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.addresses.clear();
        self.names.clear();
        self.uuids.clear();
        self.payloads.clear();
        self.enabled = false;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// First attribute of `subjects` matched by this list, regardless of mode.
    fn first_match(&self, subjects: &Subjects<'_>) -> Option<PatternKind> {
        if self
            .addresses
            .iter()
            .any(|p| address_matches(p, subjects.mac))
        {
            return Some(PatternKind::Mac);
        }
        if contains_any(&self.names, subjects.name.as_deref()) {
            return Some(PatternKind::Name);
        }
        if contains_any(&self.uuids, subjects.uuid.as_deref()) {
            return Some(PatternKind::Uuid);
        }
        if contains_any(&self.payloads, Some(subjects.payload)) {
            return Some(PatternKind::Payload);
        }
        None
    }

    pub fn summary(&self) -> ListSummary {
        ListSummary {
            active: self.is_active(),
            mac: self.addresses.len(),
            name: self.names.len(),
            uuid: self.uuids.len(),
            payload: self.payloads.len(),
        }
    }
}

impl Default for PatternList {
    fn default() -> Self {
        Self::new()
    }
}

/// Pattern counts and mode of one list, for status reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListSummary {
    pub active: bool,
    pub mac: usize,
    pub name: usize,
    pub uuid: usize,
    pub payload: usize,
}

/// Both lists, for status reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterSummary {
    pub allow: ListSummary,
    pub deny: ListSummary,
}

/// The pattern that decided an observation's fate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hit {
    pub list: ListKind,
    pub kind: PatternKind,
}

/// Result of filter evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterResult {
    /// Whether the observation should be shown
    pub show: bool,
    /// Pattern that decided it; `None` when no list was active
    pub hit: Option<Hit>,
}

/// Allow-list plus deny-list.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    allow: PatternList,
    deny: PatternList,
}

impl Filter {
    pub const fn new() -> Self {
        Self {
            allow: PatternList::new(),
            deny: PatternList::new(),
        }
    }

    pub fn list(&self, list: ListKind) -> &PatternList {
        match list {
            ListKind::Allow => &self.allow,
            ListKind::Deny => &self.deny,
        }
    }

    fn list_mut(&mut self, list: ListKind) -> &mut PatternList {
        match list {
            ListKind::Allow => &mut self.allow,
            ListKind::Deny => &mut self.deny,
        }
    }

    pub fn add(
        &mut self,
        list: ListKind,
        kind: PatternKind,
        value: &str,
    ) -> Result<(), PatternError> {
        match self.list_mut(list).add(kind, value) {
            Ok(()) => {
                log::debug!(
                    "{} {} pattern added: {}",
                    list.as_str(),
                    kind.as_str(),
                    value.trim()
                );
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "{} {} pattern '{}' rejected: {}",
                    list.as_str(),
                    kind.as_str(),
                    value.trim(),
                    e
                );
                Err(e)
            }
        }
    }

    pub fn add_allow(&mut self, kind: PatternKind, value: &str) -> Result<(), PatternError> {
        self.add(ListKind::Allow, kind, value)
    }

    pub fn add_deny(&mut self, kind: PatternKind, value: &str) -> Result<(), PatternError> {
        self.add(ListKind::Deny, kind, value)
    }

    pub fn clear_allow(&mut self) {
        self.allow.clear();
        log::info!("Allow-list cleared");
    }

    pub fn clear_deny(&mut self) {
        self.deny.clear();
        log::info!("Deny-list cleared");
    }

    pub fn clear_all(&mut self) {
        self.clear_deny();
        self.clear_allow();
    }

    /// Turn both lists off, keeping their patterns.
    pub fn disable(&mut self) {
        self.allow.set_enabled(false);
        self.deny.set_enabled(false);
        log::info!("Filters disabled");
    }

    /// Turn both lists back on. A list with no patterns stays off.
    pub fn enable(&mut self) {
        self.allow.set_enabled(true);
        self.deny.set_enabled(true);
        log::info!(
            "Filters enabled (allow {}, deny {})",
            if self.allow.is_active() { "active" } else { "off" },
            if self.deny.is_active() { "active" } else { "off" },
        );
    }

    /// Evaluate an observation against the lists in precedence order.
    pub fn evaluate(&self, obs: &Observation) -> FilterResult {
        if self.allow.is_active() {
            let subjects = Subjects::of(obs);
            return match self.allow.first_match(&subjects) {
                Some(kind) => FilterResult {
                    show: true,
                    hit: Some(Hit {
                        list: ListKind::Allow,
                        kind,
                    }),
                },
                None => FilterResult {
                    show: false,
                    hit: None,
                },
            };
        }

        if self.deny.is_active() {
            let subjects = Subjects::of(obs);
            return match self.deny.first_match(&subjects) {
                Some(kind) => FilterResult {
                    show: false,
                    hit: Some(Hit {
                        list: ListKind::Deny,
                        kind,
                    }),
                },
                None => FilterResult {
                    show: true,
                    hit: None,
                },
            };
        }

        FilterResult {
            show: true,
            hit: None,
        }
    }

    pub fn should_show(&self, obs: &Observation) -> bool {
        self.evaluate(obs).show
    }

    pub fn summary(&self) -> FilterSummary {
        FilterSummary {
            allow: self.allow.summary(),
            deny: self.deny.summary(),
        }
    }
}

/// Uppercased match subjects of one observation.
struct Subjects<'a> {
    /// Already uppercase colon-hex
    mac: &'a str,
    name: Option<NameString>,
    uuid: Option<UuidString>,
    /// Already uppercase hex
    payload: &'a str,
}

impl<'a> Subjects<'a> {
    fn of(obs: &'a Observation) -> Self {
        Self {
            mac: obs.mac.as_str(),
            name: obs.name.as_deref().map(to_upper),
            uuid: obs.service_id.as_deref().map(to_upper),
            payload: obs.raw_hex.as_str(),
        }
    }
}

/// Full-length patterns compare exactly; shorter ones compare only the
/// overlapping leading window.
fn address_matches(pattern: &str, mac: &str) -> bool {
    if pattern.len() >= FULL_ADDRESS_LEN {
        return pattern == mac;
    }
    let n = pattern.len().min(mac.len());
    pattern.as_bytes()[..n] == mac.as_bytes()[..n]
}

fn contains_any(patterns: &[Pattern], subject: Option<&str>) -> bool {
    match subject {
        Some(s) if !s.is_empty() => patterns.iter().any(|p| s.contains(p.as_str())),
        _ => false,
    }
}

fn to_upper<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c.to_ascii_uppercase()).is_err() {
            break;
        }
    }
    out
}

fn is_address_text(s: &str) -> bool {
    s.chars().all(|c| c == ':' || c.is_ascii_hexdigit())
}

fn normalize(kind: PatternKind, value: &str) -> Result<Pattern, PatternError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PatternError::Empty);
    }
    if value.len() > PATTERN_LEN {
        return Err(PatternError::TooLong);
    }

    let value = match kind {
        PatternKind::Mac => {
            if value.len() < MIN_ADDRESS_PATTERN_LEN
                || value.len() > FULL_ADDRESS_LEN
                || !is_address_text(value)
            {
                return Err(PatternError::InvalidAddress);
            }
            value
        }
        PatternKind::Oui => {
            // is_address_text guarantees ASCII, so slicing at OUI_LEN is safe
            if value.len() < OUI_LEN || !is_address_text(value) {
                return Err(PatternError::InvalidAddress);
            }
            &value[..OUI_LEN]
        }
        PatternKind::Payload => {
            if !value.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(PatternError::InvalidHex);
            }
            value
        }
        PatternKind::Name | PatternKind::Uuid => value,
    };

    Ok(to_upper(value))
}

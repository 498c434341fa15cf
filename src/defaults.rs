/// Built-in deny-list: consumer phones, laptops, wearables and media devices
/// that flood a scan without being of interest.
///
/// Address prefixes cover the most common Apple and Google/Nest OUIs. Name
/// keywords and payload signatures catch the same vendors behind randomized
/// addresses.
use core::fmt::Write;

use crate::filter::{Filter, ListKind, PatternKind};
use crate::protocol::MacString;

/// Known OUI prefixes (3-byte prefix, vendor name).
pub static DENY_OUIS: &[([u8; 3], &str)] = &[
    // === Apple ===
    ([0xA4, 0xCF, 0x12], "Apple"),
    ([0x4C, 0x57, 0xCA], "Apple"),
    ([0x00, 0x00, 0x00], "Apple"),
    ([0xA8, 0x88, 0x08], "Apple"),
    ([0x04, 0x0C, 0xCE], "Apple"),
    ([0x98, 0x01, 0xA7], "Apple"),
    ([0x3C, 0xE0, 0x72], "Apple"),
    ([0x00, 0xCD, 0xFE], "Apple"),
    ([0xA4, 0xD1, 0x8C], "Apple"),
    ([0x78, 0xA3, 0xE4], "Apple"),
    ([0xDC, 0x2B, 0x2A], "Apple"),
    ([0x00, 0x26, 0xBB], "Apple"),
    ([0xF0, 0xDB, 0xE2], "Apple"),
    ([0x68, 0x96, 0x7B], "Apple"),
    ([0x8C, 0x85, 0x90], "Apple"),
    ([0x80, 0xE6, 0x50], "Apple"),
    ([0x00, 0x1F, 0xF3], "Apple"),
    ([0x00, 0x23, 0x12], "Apple"),
    ([0x00, 0x25, 0x00], "Apple"),
    ([0x00, 0x25, 0xBC], "Apple"),
    ([0x34, 0x15, 0x9E], "Apple"),
    ([0x00, 0x88, 0x65], "Apple"),
    ([0x00, 0xF4, 0xB9], "Apple"),
    ([0x84, 0x38, 0x35], "Apple"),
    ([0xC8, 0x2A, 0x14], "Apple"),
    ([0xF0, 0xD1, 0xA9], "Apple"),
    ([0x70, 0x73, 0xCB], "Apple"),
    ([0xF4, 0xF1, 0x5A], "Apple"),
    ([0xD4, 0x90, 0x9C], "Apple"),
    ([0x98, 0xB8, 0xE3], "Apple"),
    ([0xAC, 0x3C, 0x0B], "Apple"),
    ([0x00, 0x3E, 0xE1], "Apple"),
    ([0xDC, 0x86, 0xD8], "Apple"),
    ([0x3C, 0x07, 0x54], "Apple"),
    ([0x60, 0x03, 0x08], "Apple"),
    ([0xB0, 0x65, 0xBD], "Apple"),
    ([0xF0, 0xDC, 0xE2], "Apple"),
    ([0x94, 0xF6, 0xA3], "Apple"),
    ([0x98, 0xFE, 0x94], "Apple"),
    ([0xE0, 0xC7, 0x67], "Apple"),
    ([0x70, 0xCD, 0x60], "Apple"),
    ([0xBC, 0x4C, 0xC4], "Apple"),
    ([0x48, 0x43, 0x7C], "Apple"),
    ([0x34, 0xC0, 0x59], "Apple"),
    ([0xE8, 0x80, 0x2E], "Apple"),
    ([0x90, 0x84, 0x0D], "Apple"),
    ([0xD8, 0x30, 0x62], "Apple"),
    ([0x18, 0xE7, 0xF4], "Apple"),
    ([0x18, 0x20, 0x32], "Apple"),
    ([0x00, 0xF7, 0x6F], "Apple"),
    // === Google / Nest ===
    ([0xF4, 0xF5, 0xE8], "Google"),
    ([0xD0, 0xE7, 0x82], "Google"),
    ([0x2C, 0xF0, 0xA2], "Google"),
    ([0x5C, 0xF8, 0xA1], "Google"),
    ([0x7C, 0x2F, 0x80], "Google"),
    ([0x1C, 0xF2, 0x9A], "Google"),
    ([0x00, 0x1A, 0x11], "Google"),
    ([0x00, 0x26, 0xB7], "Google"),
    ([0x00, 0x17, 0xC9], "Google"),
    ([0x00, 0x19, 0x07], "Google"),
    ([0x00, 0x21, 0x6A], "Google"),
    ([0x00, 0x21, 0x91], "Google"),
    ([0x00, 0x23, 0x4D], "Google"),
    ([0x00, 0x25, 0x9C], "Google"),
    ([0x34, 0xFC, 0xEF], "Google"),
    ([0x3C, 0x5A, 0xB4], "Google"),
    ([0x40, 0xB4, 0xCD], "Google"),
    ([0x54, 0x60, 0x09], "Google"),
    ([0x58, 0xCB, 0x52], "Google"),
    ([0x6C, 0xAD, 0xF8], "Google"),
    ([0x74, 0xE5, 0x43], "Google"),
    ([0x78, 0xD6, 0xF0], "Google"),
    ([0x7C, 0xBB, 0x8A], "Google"),
    ([0x88, 0x75, 0x56], "Google"),
    ([0x90, 0xE7, 0xC4], "Google"),
];

/// Local name keywords (case-insensitive substring match).
pub static DENY_NAMES: &[&str] = &[
    "IPHONE",
    "IPAD",
    "MACBOOK",
    "AIRPODS",
    "APPLE",
    "WATCH",
    "PIXEL",
    "GOOGLE",
    "NEST",
    "CHROMECAST",
    "ANDROID",
];

/// Raw payload signatures (hex substring match).
pub static DENY_PAYLOADS: &[&str] = &[
    "4C00", // Apple manufacturer data (company ID 0x004C, little-endian)
    "E000", // Google manufacturer data (company ID 0x00E0, little-endian)
];

/// Render an OUI as "A4:CF:12".
pub fn oui_string(oui: &[u8; 3]) -> MacString {
    let mut s = MacString::new();
    let _ = write!(s, "{:02X}:{:02X}:{:02X}", oui[0], oui[1], oui[2]);
    s
}

/// Well-known Bluetooth SIG company identifiers seen in manufacturer data.
pub static COMPANY_IDS: &[(u16, &str)] = &[
    (0x0006, "Microsoft"),
    (0x004C, "Apple"),
    (0x0059, "Nordic Semiconductor"),
    (0x0075, "Samsung"),
    (0x00E0, "Google"),
];

/// Vendor name for a manufacturer-data company ID, if it is a known one.
pub fn company_name(id: u16) -> Option<&'static str> {
    COMPANY_IDS
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, vendor)| *vendor)
}

/// Add the built-in deny patterns to `filter`; the deny-list becomes active.
///
/// Patterns go through the normal validated add path. Returns how many were
/// accepted.
pub fn load_builtin(filter: &mut Filter) -> usize {
    log::info!("Loading built-in deny-list");

    let mut loaded = 0;
    let mut add = |kind: PatternKind, value: &str| {
        if filter.add(ListKind::Deny, kind, value).is_ok() {
            loaded += 1;
        }
    };

    for (oui, _) in DENY_OUIS {
        add(PatternKind::Oui, &oui_string(oui));
    }
    for name in DENY_NAMES {
        add(PatternKind::Name, name);
    }
    for payload in DENY_PAYLOADS {
        add(PatternKind::Payload, payload);
    }

    let summary = filter.summary().deny;
    log::info!(
        "Loaded {} OUIs, {} names, {} payloads (deny-list {})",
        summary.mac,
        summary.name,
        summary.payload,
        if summary.active { "active" } else { "off" }
    );
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ListMode;
    use crate::scanner::{Address, AdvReport, Observation};

    fn obs(mac: [u8; 6], payload: &[u8]) -> Observation {
        Observation::from_report(&AdvReport::new(Address::new(mac), -60, payload))
    }

    #[test]
    fn seed_counts() {
        let apple = DENY_OUIS.iter().filter(|(_, v)| *v == "Apple").count();
        let google = DENY_OUIS.iter().filter(|(_, v)| *v == "Google").count();
        assert_eq!(apple, 50);
        assert_eq!(google, 25);
        assert_eq!(DENY_NAMES.len(), 11);
        assert_eq!(DENY_PAYLOADS.len(), 2);
    }

    #[test]
    fn no_duplicate_ouis() {
        for (i, (a, _)) in DENY_OUIS.iter().enumerate() {
            for (b, _) in &DENY_OUIS[i + 1..] {
                assert_ne!(a, b, "duplicate OUI {}", oui_string(a));
            }
        }
    }

    #[test]
    fn oui_formatting() {
        assert_eq!(oui_string(&[0xA4, 0xCF, 0x12]).as_str(), "A4:CF:12");
        assert_eq!(oui_string(&[0x00, 0x1A, 0x11]).as_str(), "00:1A:11");
    }

    #[test]
    fn company_lookup() {
        assert_eq!(company_name(0x004C), Some("Apple"));
        assert_eq!(company_name(0x00E0), Some("Google"));
        assert_eq!(company_name(0x0059), Some("Nordic Semiconductor"));
        assert_eq!(company_name(0x1234), None);
    }

    #[test]
    fn payload_signatures_match_company_ids() {
        // Deny payloads are the little-endian company IDs of Apple and Google
        for (sig, vendor) in DENY_PAYLOADS.iter().zip(["Apple", "Google"]) {
            let lo = u8::from_str_radix(&sig[..2], 16).unwrap();
            let hi = u8::from_str_radix(&sig[2..], 16).unwrap();
            assert_eq!(company_name(u16::from_le_bytes([lo, hi])), Some(vendor));
        }
    }

    #[test]
    fn load_builtin_activates_deny_list() {
        let mut filter = Filter::new();
        let loaded = load_builtin(&mut filter);
        assert_eq!(loaded, DENY_OUIS.len() + DENY_NAMES.len() + DENY_PAYLOADS.len());

        let deny = filter.list(ListKind::Deny);
        assert_eq!(deny.mode(), ListMode::Active);
        assert_eq!(deny.patterns(PatternKind::Mac).len(), 75);
        assert_eq!(deny.patterns(PatternKind::Name).len(), 11);
        assert_eq!(deny.patterns(PatternKind::Payload).len(), 2);
        assert!(deny.patterns(PatternKind::Uuid).is_empty());
        assert_eq!(filter.list(ListKind::Allow).mode(), ListMode::Off);
    }

    #[test]
    fn builtin_hides_vendor_devices() {
        let mut filter = Filter::new();
        load_builtin(&mut filter);

        // Apple OUI
        assert!(!filter.should_show(&obs([0xA4, 0xCF, 0x12, 0x00, 0x00, 0x01], &[])));
        // Randomized address, Apple manufacturer data
        assert!(!filter.should_show(&obs(
            [0x7A, 0x11, 0x22, 0x33, 0x44, 0x55],
            &[0x05, 0xFF, 0x4C, 0x00, 0x10, 0x05]
        )));
        // Randomized address, phone name
        assert!(!filter.should_show(&obs(
            [0x7A, 0x11, 0x22, 0x33, 0x44, 0x55],
            &[0x07, 0x09, b'P', b'i', b'x', b'e', b'l', b'7']
        )));
        // Unrelated sensor
        assert!(filter.should_show(&obs(
            [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
            &[0x02, 0x01, 0x06, 0x03, 0x09, 0x41, 0x42]
        )));
    }

    #[test]
    fn load_builtin_twice_appends() {
        let mut filter = Filter::new();
        load_builtin(&mut filter);
        load_builtin(&mut filter);
        assert_eq!(filter.list(ListKind::Deny).patterns(PatternKind::Mac).len(), 128);
    }
}

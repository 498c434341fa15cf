//! BLE advertisement data (AD structure) decoder.
//!
//! AD structure format: [length] [type] [data...], where `length` counts the
//! type byte plus the data. A zero length byte ends the payload. Truncated or
//! inconsistent tails are dropped silently: decoding just ends early.

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::protocol::HexString;
use crate::scanner::hex_encode;

pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_INCOMPLETE_UUIDS_16: u8 = 0x02;
pub const AD_TYPE_COMPLETE_UUIDS_16: u8 = 0x03;
pub const AD_TYPE_SHORT_NAME: u8 = 0x08;
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
pub const AD_TYPE_TX_POWER: u8 = 0x0A;
pub const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// Longest string [`ad_type_name`] returns
pub const MAX_TYPE_NAME_LEN: usize = 33;

/// One decoded AD structure, borrowed from the payload it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdStructure<'a> {
    pub ad_type: u8,
    pub data: &'a [u8],
}

impl AdStructure<'_> {
    /// Length byte as it appears on the wire (type byte + data).
    pub fn declared_len(&self) -> usize {
        self.data.len() + 1
    }

    pub fn type_name(&self) -> &'static str {
        ad_type_name(self.ad_type)
    }
}

/// Lazy iterator over the AD structures of a payload.
///
/// Cheap to clone: a clone continues from the same cursor. Call [`decode`]
/// again to start over.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    payload: &'a [u8],
    pos: usize,
    done: bool,
}

/// Decode a raw advertisement payload into its AD structures.
pub fn decode(payload: &[u8]) -> AdStructures<'_> {
    AdStructures {
        payload,
        pos: 0,
        done: false,
    }
}

impl<'a> AdStructures<'a> {
    /// Number of payload bytes covered by the structures yielded so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = AdStructure<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let remaining = self.payload.len() - self.pos;
        if remaining < 2 {
            self.done = true;
            return None;
        }

        let ad_len = self.payload[self.pos] as usize;
        if ad_len == 0 || 1 + ad_len > remaining {
            self.done = true;
            return None;
        }

        let field = AdStructure {
            ad_type: self.payload[self.pos + 1],
            data: &self.payload[self.pos + 2..self.pos + 1 + ad_len],
        };
        self.pos += 1 + ad_len;
        Some(field)
    }
}

/// Assigned name of an AD type, for reports.
pub fn ad_type_name(ad_type: u8) -> &'static str {
    match ad_type {
        AD_TYPE_FLAGS => "Flags",
        AD_TYPE_INCOMPLETE_UUIDS_16 => "Incomplete 16-bit UUIDs",
        AD_TYPE_COMPLETE_UUIDS_16 => "16-bit Service UUIDs",
        0x04 => "Incomplete 32-bit UUIDs",
        0x05 => "Complete 32-bit UUIDs",
        0x06 => "Incomplete 128-bit UUIDs",
        0x07 => "128-bit Service UUIDs",
        AD_TYPE_SHORT_NAME => "Shortened Local Name",
        AD_TYPE_COMPLETE_NAME => "Complete Local Name",
        AD_TYPE_TX_POWER => "TX Power Level",
        0x0D => "Class of Device",
        0x14 => "List of 16-bit Solicitation UUIDs",
        AD_TYPE_SERVICE_DATA_16 => "Service Data (16-bit UUID)",
        0x19 => "Appearance",
        0x1A => "Advertising Interval",
        AD_TYPE_MANUFACTURER_DATA => "Manufacturer Data",
        _ => "Unknown Type",
    }
}

impl Serialize for AdStructure<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut data = HexString::new();
        hex_encode(self.data, &mut data);

        let mut s = serializer.serialize_struct("AdStructure", 3)?;
        s.serialize_field("type", &self.ad_type)?;
        s.serialize_field("name", self.type_name())?;
        s.serialize_field("data", data.as_str())?;
        s.end()
    }
}

/// Serializes as a JSON array of the remaining structures without
/// consuming `self`.
impl Serialize for AdStructures<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Re-encode yielded structures back into [len][type][data] form.
    fn reencode(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for field in decode(payload) {
            out.push(field.declared_len() as u8);
            out.push(field.ad_type);
            out.extend_from_slice(field.data);
        }
        out
    }

    #[test]
    fn empty_payload_yields_nothing() {
        assert_eq!(decode(&[]).count(), 0);
    }

    #[test]
    fn flags_and_name() {
        let payload = [0x02, 0x01, 0x06, 0x03, 0x09, 0x41, 0x42];
        let fields: Vec<_> = decode(&payload).collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].ad_type, AD_TYPE_FLAGS);
        assert_eq!(fields[0].data, &[0x06]);
        assert_eq!(fields[1].ad_type, AD_TYPE_COMPLETE_NAME);
        assert_eq!(fields[1].data, b"AB");
    }

    #[test]
    fn zero_length_terminates() {
        let payload = [0x02, 0x01, 0x06, 0x00, 0x03, 0x09, 0x41, 0x42];
        let fields: Vec<_> = decode(&payload).collect();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].ad_type, AD_TYPE_FLAGS);
    }

    #[test]
    fn truncated_tail_dropped() {
        // Second structure claims 5 bytes but only 2 follow
        let payload = [0x02, 0x01, 0x06, 0x05, 0xFF, 0x4C];
        let mut it = decode(&payload);
        assert_eq!(it.next().map(|f| f.ad_type), Some(AD_TYPE_FLAGS));
        assert_eq!(it.next(), None);
        assert_eq!(it.consumed(), 3);
        // Stays exhausted
        assert_eq!(it.next(), None);
        assert_eq!(it.consumed(), 3);
    }

    #[test]
    fn single_trailing_byte_dropped() {
        let payload = [0x02, 0x01, 0x06, 0x07];
        assert_eq!(decode(&payload).count(), 1);
    }

    #[test]
    fn length_one_gives_empty_value() {
        let payload = [0x01, 0x09];
        let fields: Vec<_> = decode(&payload).collect();
        assert_eq!(fields.len(), 1);
        assert!(fields[0].data.is_empty());
    }

    #[test]
    fn max_length_structure() {
        let mut payload = [0xAAu8; 255];
        payload[0] = 254;
        payload[1] = AD_TYPE_MANUFACTURER_DATA;
        let fields: Vec<_> = decode(&payload).collect();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].data.len(), 253);
    }

    #[test]
    fn clone_continues_from_same_point() {
        let payload = [0x02, 0x01, 0x06, 0x03, 0x09, 0x41, 0x42];
        let mut it = decode(&payload);
        it.next();
        let fork = it.clone();
        assert_eq!(it.count(), 1);
        assert_eq!(fork.count(), 1);
        assert_eq!(decode(&payload).count(), 2);
    }

    #[test]
    fn reencoding_reproduces_prefix() {
        let payloads: [&[u8]; 6] = [
            &[0x02, 0x01, 0x06, 0x03, 0x09, 0x41, 0x42],
            &[0x02, 0x01, 0x06, 0x00, 0xFF, 0xFF],
            &[0x02, 0x01, 0x06, 0x09, 0xFF],
            &[0x05],
            &[0x03, 0x03, 0x0F, 0x18, 0x02, 0x0A, 0xF4],
            &[0xFF, 0x01, 0x02],
        ];
        for payload in payloads {
            let out = reencode(payload);
            assert!(out.len() <= payload.len());
            assert_eq!(&payload[..out.len()], &out[..], "payload {payload:02X?}");
        }
    }

    #[test]
    fn never_overruns_on_pseudo_random_input() {
        // xorshift keeps the test deterministic without extra dev-deps
        let mut state: u32 = 0x1234_5678;
        for _ in 0..500 {
            let mut buf = [0u8; 64];
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let len = (state % 65) as usize;
            for b in buf.iter_mut().take(len) {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                *b = (state & 0x1F) as u8;
            }
            let payload = &buf[..len];
            let mut steps = 0;
            let mut it = decode(payload);
            for field in it.by_ref() {
                assert!(field.data.len() < payload.len());
                steps += 1;
            }
            assert!(steps <= payload.len() / 2);
            assert!(it.consumed() <= payload.len());
            let out = reencode(payload);
            assert_eq!(&payload[..out.len()], &out[..]);
        }
    }

    #[test]
    fn type_names() {
        assert_eq!(ad_type_name(AD_TYPE_FLAGS), "Flags");
        assert_eq!(ad_type_name(AD_TYPE_MANUFACTURER_DATA), "Manufacturer Data");
        assert_eq!(ad_type_name(0x42), "Unknown Type");
    }

    #[test]
    fn type_names_fit_declared_bound() {
        let longest = (0..=u8::MAX).map(|t| ad_type_name(t).len()).max();
        assert_eq!(longest, Some(MAX_TYPE_NAME_LEN));
    }

    #[test]
    fn serializes_as_array() {
        let payload = [0x02, 0x01, 0x06, 0x03, 0x09, 0x41, 0x42];
        let mut buf = [0u8; 256];
        let len = serde_json_core::to_slice(&decode(&payload), &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(
            json,
            r#"[{"type":1,"name":"Flags","data":"06"},{"type":9,"name":"Complete Local Name","data":"4142"}]"#
        );
    }
}

/// Bounded per-session device cache used to suppress repeat reports.
///
/// Keyed by address. At most [`CACHE_CAPACITY`] devices are tracked; there is
/// no eviction. A device first seen while the cache is full is still
/// classified `New`, just not stored, so it keeps coming back as `New` until
/// the next session reset.
use heapless::index_map::FnvIndexMap;
use serde::Serialize;

use crate::protocol::{HexString, NameString};
use crate::scanner::{Address, Observation};

/// Devices tracked per session
pub const CACHE_CAPACITY: usize = 100;

/// Backing map size; `FnvIndexMap` needs a power of two
const MAP_SLOTS: usize = 128;

/// RSSI change (dBm) above which a known device counts as changed
pub const RSSI_JUMP_DBM: u16 = 10;

/// Milliseconds since some fixed origin (boot, session start, capture start)
pub type Millis = u32;

/// Outcome of checking an observation against the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    New,
    Changed,
    Duplicate,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::New => "new",
            Classification::Changed => "changed",
            Classification::Duplicate => "duplicate",
        }
    }
}

/// Last known state of one device
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDevice {
    pub address: Address,
    pub name: Option<NameString>,
    pub raw_hex: HexString,
    pub rssi: i8,
    pub last_seen: Millis,
}

impl CachedDevice {
    fn from_observation(obs: &Observation, now: Millis) -> Self {
        Self {
            address: obs.address,
            name: obs.name.clone(),
            raw_hex: obs.raw_hex.clone(),
            rssi: obs.rssi,
            last_seen: now,
        }
    }
}

pub struct DeviceCache {
    devices: FnvIndexMap<Address, CachedDevice, MAP_SLOTS>,
    /// `New` sightings that could not be stored this session
    untracked: u32,
}

impl DeviceCache {
    pub const fn new() -> Self {
        Self {
            devices: FnvIndexMap::new(),
            untracked: 0,
        }
    }

    /// Classify an admitted observation and update the cache.
    pub fn classify(&mut self, obs: &Observation, now: Millis) -> Classification {
        if let Some(dev) = self.devices.get_mut(&obs.address) {
            let name_changed = match &obs.name {
                Some(name) => dev.name.as_ref() != Some(name),
                None => false,
            };
            let payload_changed = dev.raw_hex != obs.raw_hex;
            let signal_jumped =
                (i16::from(dev.rssi) - i16::from(obs.rssi)).unsigned_abs() > RSSI_JUMP_DBM;

            dev.last_seen = now;
            if !name_changed && !payload_changed && !signal_jumped {
                return Classification::Duplicate;
            }

            if name_changed {
                dev.name = obs.name.clone();
            }
            if payload_changed {
                dev.raw_hex = obs.raw_hex.clone();
            }
            dev.rssi = obs.rssi;
            return Classification::Changed;
        }

        if self.devices.len() < CACHE_CAPACITY {
            // Cannot fail: MAP_SLOTS > CACHE_CAPACITY
            let _ = self
                .devices
                .insert(obs.address, CachedDevice::from_observation(obs, now));
        } else {
            self.untracked = self.untracked.saturating_add(1);
        }
        Classification::New
    }

    pub fn get(&self, address: &Address) -> Option<&CachedDevice> {
        self.devices.get(address)
    }

    /// Devices in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &CachedDevice> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.devices.len() >= CACHE_CAPACITY
    }

    pub fn untracked(&self) -> u32 {
        self.untracked
    }

    /// Forget everything; called at session start.
    pub fn reset(&mut self) {
        self.devices.clear();
        self.untracked = 0;
    }
}

impl Default for DeviceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::AdvReport;

    const MAC: [u8; 6] = [0xA4, 0xCF, 0x12, 0x00, 0x00, 0x01];
    const FLAGS_AB: &[u8] = &[0x02, 0x01, 0x06, 0x03, 0x09, 0x41, 0x42];

    fn obs_at(mac: [u8; 6], rssi: i8, payload: &[u8]) -> Observation {
        Observation::from_report(&AdvReport::new(Address::new(mac), rssi, payload))
    }

    fn nth_mac(i: usize) -> [u8; 6] {
        [0x02, 0x00, 0x00, 0x00, (i >> 8) as u8, i as u8]
    }

    #[test]
    fn first_sighting_is_new() {
        let mut cache = DeviceCache::new();
        assert_eq!(cache.classify(&obs_at(MAC, -60, FLAGS_AB), 0), Classification::New);
        assert_eq!(cache.len(), 1);
        let dev = cache.get(&Address::new(MAC)).unwrap();
        assert_eq!(dev.name.as_deref(), Some("AB"));
        assert_eq!(dev.rssi, -60);
    }

    #[test]
    fn identical_repeat_is_duplicate_and_refreshes_timestamp() {
        let mut cache = DeviceCache::new();
        cache.classify(&obs_at(MAC, -60, FLAGS_AB), 100);
        assert_eq!(
            cache.classify(&obs_at(MAC, -60, FLAGS_AB), 250),
            Classification::Duplicate
        );
        assert_eq!(cache.get(&Address::new(MAC)).unwrap().last_seen, 250);
    }

    #[test]
    fn small_rssi_drift_is_duplicate() {
        let mut cache = DeviceCache::new();
        cache.classify(&obs_at(MAC, -60, FLAGS_AB), 0);
        assert_eq!(
            cache.classify(&obs_at(MAC, -55, FLAGS_AB), 1),
            Classification::Duplicate
        );
        // Duplicate does not touch content
        assert_eq!(cache.get(&Address::new(MAC)).unwrap().rssi, -60);
    }

    #[test]
    fn rssi_exactly_ten_is_duplicate() {
        let mut cache = DeviceCache::new();
        cache.classify(&obs_at(MAC, -60, FLAGS_AB), 0);
        assert_eq!(
            cache.classify(&obs_at(MAC, -70, FLAGS_AB), 1),
            Classification::Duplicate
        );
    }

    #[test]
    fn rssi_jump_is_changed() {
        let mut cache = DeviceCache::new();
        cache.classify(&obs_at(MAC, -60, FLAGS_AB), 0);
        assert_eq!(
            cache.classify(&obs_at(MAC, -72, FLAGS_AB), 1),
            Classification::Changed
        );
        assert_eq!(cache.get(&Address::new(MAC)).unwrap().rssi, -72);
    }

    #[test]
    fn rssi_extremes_do_not_overflow() {
        let mut cache = DeviceCache::new();
        cache.classify(&obs_at(MAC, i8::MIN, FLAGS_AB), 0);
        assert_eq!(
            cache.classify(&obs_at(MAC, i8::MAX, FLAGS_AB), 1),
            Classification::Changed
        );
    }

    #[test]
    fn payload_change_is_changed() {
        let mut cache = DeviceCache::new();
        cache.classify(&obs_at(MAC, -60, FLAGS_AB), 0);
        let other = [0x02, 0x01, 0x06, 0x03, 0x09, 0x41, 0x43];
        assert_eq!(cache.classify(&obs_at(MAC, -60, &other), 5), Classification::Changed);
        let dev = cache.get(&Address::new(MAC)).unwrap();
        assert_eq!(dev.raw_hex.as_str(), "02010603094143");
        assert_eq!(dev.name.as_deref(), Some("AC"));
        assert_eq!(dev.last_seen, 5);
    }

    #[test]
    fn nameless_sighting_keeps_cached_name() {
        let mut cache = DeviceCache::new();
        // The payload differs, but the cached name survives a nameless sighting
        cache.classify(&obs_at(MAC, -60, FLAGS_AB), 0);
        let flags_only = [0x02, 0x01, 0x06];
        assert_eq!(
            cache.classify(&obs_at(MAC, -60, &flags_only), 1),
            Classification::Changed
        );
        assert_eq!(cache.get(&Address::new(MAC)).unwrap().name.as_deref(), Some("AB"));
    }

    #[test]
    fn capacity_bound_holds() {
        let mut cache = DeviceCache::new();
        for i in 0..=CACHE_CAPACITY {
            assert_eq!(
                cache.classify(&obs_at(nth_mac(i), -60, FLAGS_AB), i as Millis),
                Classification::New
            );
        }
        assert_eq!(cache.len(), CACHE_CAPACITY);
        assert!(cache.is_full());
        assert_eq!(cache.untracked(), 1);

        // The 101st address never gets stored, so it stays New
        let overflow = nth_mac(CACHE_CAPACITY);
        for t in 0..3 {
            assert_eq!(
                cache.classify(&obs_at(overflow, -60, FLAGS_AB), 1000 + t),
                Classification::New
            );
        }
        assert_eq!(cache.len(), CACHE_CAPACITY);
        assert_eq!(cache.untracked(), 4);

        // Stored devices are still deduplicated
        assert_eq!(
            cache.classify(&obs_at(nth_mac(0), -60, FLAGS_AB), 2000),
            Classification::Duplicate
        );
    }

    #[test]
    fn reset_clears_everything() {
        let mut cache = DeviceCache::new();
        for i in 0..=CACHE_CAPACITY {
            cache.classify(&obs_at(nth_mac(i), -60, FLAGS_AB), 0);
        }
        cache.reset();
        assert!(cache.is_empty());
        assert_eq!(cache.untracked(), 0);
        assert_eq!(cache.classify(&obs_at(MAC, -60, FLAGS_AB), 0), Classification::New);
    }

    #[test]
    fn iter_in_first_seen_order() {
        let mut cache = DeviceCache::new();
        cache.classify(&obs_at(nth_mac(2), -60, FLAGS_AB), 0);
        cache.classify(&obs_at(nth_mac(1), -60, FLAGS_AB), 0);
        let order: Vec<Address> = cache.iter().map(|d| d.address).collect();
        assert_eq!(order, [Address::new(nth_mac(2)), Address::new(nth_mac(1))]);
    }
}

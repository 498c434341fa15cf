/// Scan session engine: decode, filter and deduplicate one advertisement at
/// a time.
///
/// The engine owns every piece of mutable scan state (filter lists, device
/// cache, counters), so independent sessions are just independent engines.
/// It does no I/O and never blocks; the caller decides how to share it.
use crate::ad::{self, AdStructures};
use crate::cache::{Classification, DeviceCache, Millis};
use crate::defaults;
use crate::filter::{Filter, Hit};
use crate::protocol::DeviceMessage;
use crate::scanner::{AdvReport, Observation};

/// Runtime switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Suppress repeat reports of unchanged devices
    pub dedup: bool,
}

impl EngineConfig {
    pub const fn new() -> Self {
        Self { dedup: true }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-session counters. Everything but `session` is reset by
/// [`Engine::start_session`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Sessions started so far
    pub session: u32,
    pub received: u32,
    pub filtered: u32,
    pub duplicates: u32,
    pub reported: u32,
    /// New devices the full cache could not store
    pub untracked: u32,
}

/// An observation worth reporting.
#[derive(Debug, Clone)]
pub struct Report<'a> {
    /// `New` or `Changed`
    pub class: Classification,
    pub observation: Observation,
    /// Decoded AD structures of the payload
    pub fields: AdStructures<'a>,
    /// Allow pattern that admitted the device, if any
    pub hit: Option<Hit>,
}

impl Report<'_> {
    /// Device message for this report, stamped with `ts`.
    pub fn message(&self, ts: Millis) -> DeviceMessage<'_> {
        let obs = &self.observation;
        DeviceMessage::Device {
            mac: &obs.mac,
            name: obs.name.as_ref(),
            rssi: obs.rssi,
            uuid: obs.service_id.as_ref(),
            mfr: obs.manufacturer_id,
            vendor: obs.manufacturer_id.and_then(defaults::company_name),
            status: self.class,
            adv: &obs.raw_hex,
            ad: self.fields.clone(),
            matched: self.hit,
            ts,
        }
    }
}

/// What became of one advertisement
#[derive(Debug, Clone)]
pub enum Outcome<'a> {
    /// Rejected by the filter
    Filtered,
    /// Known device, nothing changed
    Duplicate,
    Report(Report<'a>),
}

pub struct Engine {
    filter: Filter,
    cache: DeviceCache,
    config: EngineConfig,
    stats: SessionStats,
    /// Cache exhaustion already logged this session
    overflow_logged: bool,
}

impl Engine {
    pub const fn new(config: EngineConfig) -> Self {
        Self {
            filter: Filter::new(),
            cache: DeviceCache::new(),
            config,
            stats: SessionStats {
                session: 0,
                received: 0,
                filtered: 0,
                duplicates: 0,
                reported: 0,
                untracked: 0,
            },
            overflow_logged: false,
        }
    }

    /// Engine whose deny-list is seeded from [`defaults`].
    pub fn with_builtin_filters(config: EngineConfig) -> Self {
        let mut engine = Self::new(config);
        defaults::load_builtin(&mut engine.filter);
        engine
    }

    /// Forget all devices and counters and begin a new session.
    pub fn start_session(&mut self) {
        self.cache.reset();
        self.overflow_logged = false;
        self.stats = SessionStats {
            session: self.stats.session.wrapping_add(1),
            ..SessionStats::default()
        };
        log::info!("Session {} started", self.stats.session);
    }

    /// Run one advertisement through filter and cache.
    ///
    /// The returned report borrows the payload, not the engine.
    pub fn observe<'a>(&mut self, report: &AdvReport<'a>, now: Millis) -> Outcome<'a> {
        self.stats.received = self.stats.received.saturating_add(1);

        let observation = Observation::from_report(report);
        let verdict = self.filter.evaluate(&observation);
        if !verdict.show {
            self.stats.filtered = self.stats.filtered.saturating_add(1);
            log::trace!("{} filtered ({:?})", observation.mac, verdict.hit);
            return Outcome::Filtered;
        }

        let class = if self.config.dedup {
            let class = self.cache.classify(&observation, now);
            self.note_untracked();
            class
        } else {
            Classification::New
        };

        if class == Classification::Duplicate {
            self.stats.duplicates = self.stats.duplicates.saturating_add(1);
            return Outcome::Duplicate;
        }

        self.stats.reported = self.stats.reported.saturating_add(1);
        log::debug!(
            "{} {} rssi {} name {:?}",
            observation.mac,
            class.as_str(),
            observation.rssi,
            observation.name.as_deref()
        );

        Outcome::Report(Report {
            class,
            observation,
            fields: ad::decode(report.payload()),
            hit: verdict.hit,
        })
    }

    fn note_untracked(&mut self) {
        let untracked = self.cache.untracked();
        if untracked == self.stats.untracked {
            return;
        }
        self.stats.untracked = untracked;
        if !self.overflow_logged {
            self.overflow_logged = true;
            log::warn!(
                "Device cache full ({} devices); new devices will be reported on every sighting",
                self.cache.len()
            );
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut Filter {
        &mut self.filter
    }

    pub fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Turn deduplication on or off. The cache keeps its content either way.
    pub fn set_dedup(&mut self, enabled: bool) {
        self.config.dedup = enabled;
        log::info!("Deduplication {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Distinct devices seen this session
    pub fn unique_devices(&self) -> usize {
        self.cache.len()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::new())
    }
}

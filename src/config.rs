//! Application-level configuration loading: the season catalog, the contest time zone and
//! the voting tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use thiserror::Error;
use time::{
    Date, Time, UtcOffset, format_description::BorrowedFormatItem, macros::format_description,
};
use tracing::info;

use crate::state::catalog::{Catalog, Entry, Event, EventKind};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MELLO_PARTY_BACK_CONFIG_PATH";
/// Catalog dates and times are local to this offset unless configured otherwise.
const DEFAULT_UTC_OFFSET: &str = "+01:00";

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");
const OFFSET_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

/// Problems that prevent the server from starting with a usable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("the event catalog is empty")]
    EmptyCatalog,
    #[error("event `{event_id}` is declared more than once")]
    DuplicateEvent { event_id: String },
    #[error("entry `{entry_id}` is declared more than once for event `{event_id}`")]
    DuplicateEntry { event_id: String, entry_id: String },
    #[error("entry `{entry_id}` references unknown event `{event_id}`")]
    UnknownEvent { entry_id: String, event_id: String },
    #[error("semifinal `{event_id}` has no number")]
    MissingSemifinalNumber { event_id: String },
    #[error("more than two events are scheduled on {date}")]
    CrowdedDate { date: Date },
    #[error("invalid {field} `{value}` for event `{event_id}`")]
    InvalidSchedule {
        event_id: String,
        field: &'static str,
        value: String,
    },
    #[error("invalid UTC offset `{value}`")]
    InvalidOffset { value: String },
    #[error("invalid voting setting: {0}")]
    InvalidVoting(&'static str),
}

/// Tunables of the vote engine and the draft buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingSettings {
    /// Quiet period before a draft rating is committed.
    pub debounce: Duration,
    /// How long the "saved" indicator stays up after a commit.
    pub saved_display: Duration,
    /// Attempts per transaction before contention is reported.
    pub max_transaction_attempts: u32,
    /// Interval between two runs of the status ticker.
    pub status_poll: Duration,
}

impl Default for VotingSettings {
    fn default() -> Self {
        RawVoting::default().into()
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    catalog: Catalog,
    utc_offset: UtcOffset,
    voting: VotingSettings,
}

impl AppConfig {
    /// Assemble a configuration from already validated parts.
    pub fn new(catalog: Catalog, utc_offset: UtcOffset, voting: VotingSettings) -> Self {
        Self {
            catalog,
            utc_offset,
            voting,
        }
    }

    /// Load the configuration from disk, falling back to the built-in season when no file
    /// exists. A file that exists but cannot be read, parsed or validated is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let raw = serde_json::from_str::<RawConfig>(&contents).map_err(|source| {
                    ConfigError::Parse {
                        path: path.clone(),
                        source,
                    }
                })?;
                let config = Self::try_from(raw)?;
                info!(
                    path = %path.display(),
                    events = config.catalog.events().len(),
                    "loaded configuration"
                );
                Ok(config)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in season catalog"
                );
                Self::builtin()
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Parse a configuration document.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let raw = serde_json::from_str::<RawConfig>(contents).map_err(|source| {
            ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            }
        })?;
        Self::try_from(raw)
    }

    /// Configuration shipped with the binary: the 2026 season with default tunables.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::try_from(RawConfig::default())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Offset of the contest's local time from UTC.
    pub fn utc_offset(&self) -> UtcOffset {
        self.utc_offset
    }

    pub fn voting(&self) -> &VotingSettings {
        &self.voting
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    utc_offset: String,
    events: Option<Vec<RawEvent>>,
    entries: Option<Vec<RawEntry>>,
    voting: RawVoting,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            utc_offset: DEFAULT_UTC_OFFSET.to_owned(),
            events: None,
            entries: None,
            voting: RawVoting::default(),
        }
    }
}

impl TryFrom<RawConfig> for AppConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let utc_offset = UtcOffset::parse(&raw.utc_offset, OFFSET_FORMAT).map_err(|_| {
            ConfigError::InvalidOffset {
                value: raw.utc_offset.clone(),
            }
        })?;

        // A file that only tweaks tunables keeps the built-in season.
        let (events, entries) = match raw.events {
            Some(events) => (events, raw.entries.unwrap_or_default()),
            None => (default_events(), raw.entries.unwrap_or_else(default_entries)),
        };
        let events = events
            .into_iter()
            .map(Event::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let entries = entries.into_iter().map(Entry::from).collect();
        let catalog = Catalog::new(events, entries)?;

        if raw.voting.max_transaction_attempts == 0 {
            return Err(ConfigError::InvalidVoting(
                "max_transaction_attempts must be at least 1",
            ));
        }
        if raw.voting.status_poll.is_zero() {
            return Err(ConfigError::InvalidVoting(
                "status_poll_secs must be at least 1",
            ));
        }

        Ok(Self {
            catalog,
            utc_offset,
            voting: raw.voting.into(),
        })
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawVoting {
    #[serde(rename = "debounce_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    debounce: Duration,
    #[serde(rename = "saved_display_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    saved_display: Duration,
    max_transaction_attempts: u32,
    #[serde(rename = "status_poll_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    status_poll: Duration,
}

impl Default for RawVoting {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            saved_display: Duration::from_millis(1_500),
            max_transaction_attempts: 5,
            status_poll: Duration::from_secs(30),
        }
    }
}

impl From<RawVoting> for VotingSettings {
    fn from(value: RawVoting) -> Self {
        Self {
            debounce: value.debounce,
            saved_display: value.saved_display,
            max_transaction_attempts: value.max_transaction_attempts,
            status_poll: value.status_poll,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawEventKind {
    Semifinal,
    #[serde(alias = "finalkval")]
    FinalPreQualifier,
    Final,
}

impl From<RawEventKind> for EventKind {
    fn from(value: RawEventKind) -> Self {
        match value {
            RawEventKind::Semifinal => EventKind::Semifinal,
            RawEventKind::FinalPreQualifier => EventKind::FinalPreQualifier,
            RawEventKind::Final => EventKind::Final,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of an event; `date` is `YYYY-MM-DD` and `time` is `HH:MM`.
struct RawEvent {
    id: String,
    kind: RawEventKind,
    #[serde(default)]
    number: Option<u8>,
    name: String,
    date: String,
    time: String,
    city: String,
    venue: String,
}

impl TryFrom<RawEvent> for Event {
    type Error = ConfigError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let date = Date::parse(&raw.date, DATE_FORMAT).map_err(|_| ConfigError::InvalidSchedule {
            event_id: raw.id.clone(),
            field: "date",
            value: raw.date.clone(),
        })?;
        let time = Time::parse(&raw.time, TIME_FORMAT).map_err(|_| ConfigError::InvalidSchedule {
            event_id: raw.id.clone(),
            field: "time",
            value: raw.time.clone(),
        })?;

        Ok(Self {
            id: raw.id,
            kind: raw.kind.into(),
            number: raw.number,
            name: raw.name,
            date,
            time,
            city: raw.city,
            venue: raw.venue,
        })
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of an entry. The id defaults to `{event_id}-{start_number}`.
struct RawEntry {
    #[serde(default)]
    id: Option<String>,
    event_id: String,
    start_number: u8,
    artist: String,
    song: String,
    #[serde(default)]
    songwriters: Vec<String>,
    #[serde(default)]
    bio: Option<String>,
}

impl From<RawEntry> for Entry {
    fn from(raw: RawEntry) -> Self {
        let id = raw
            .id
            .unwrap_or_else(|| format!("{}-{}", raw.event_id, raw.start_number));
        Self {
            id,
            event_id: raw.event_id,
            start_number: raw.start_number,
            artist: raw.artist,
            song: raw.song,
            songwriters: raw.songwriters,
            bio: raw.bio,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[allow(clippy::too_many_arguments)]
fn raw_event(
    id: &str,
    kind: RawEventKind,
    number: Option<u8>,
    name: &str,
    date: &str,
    time: &str,
    city: &str,
    venue: &str,
) -> RawEvent {
    RawEvent {
        id: id.to_owned(),
        kind,
        number,
        name: name.to_owned(),
        date: date.to_owned(),
        time: time.to_owned(),
        city: city.to_owned(),
        venue: venue.to_owned(),
    }
}

/// Built-in 2026 schedule.
#[rustfmt::skip]
fn default_events() -> Vec<RawEvent> {
    use RawEventKind::*;
    vec![
        raw_event("dt1", Semifinal, Some(1), "Deltävling 1", "2026-01-31", "20:00", "Linköping", "Saab Arena"),
        raw_event("dt2", Semifinal, Some(2), "Deltävling 2", "2026-02-07", "20:00", "Göteborg", "Scandinavium"),
        raw_event("dt3", Semifinal, Some(3), "Deltävling 3", "2026-02-14", "20:00", "Kristianstad", "Kristianstad Arena"),
        raw_event("dt4", Semifinal, Some(4), "Deltävling 4", "2026-02-21", "20:00", "Malmö", "Malmö Arena"),
        raw_event("dt5", Semifinal, Some(5), "Deltävling 5", "2026-02-28", "20:00", "Sundsvall", "Gärdehov Arena"),
        raw_event("finalkval", FinalPreQualifier, None, "Finalkval", "2026-02-28", "21:30", "Sundsvall", "Gärdehov Arena"),
        raw_event("final", Final, None, "Final", "2026-03-07", "20:00", "Stockholm", "Strawberry Arena"),
    ]
}

/// Built-in line-ups of the semifinals.
#[rustfmt::skip]
fn default_entries() -> Vec<RawEntry> {
    const LINEUPS: &[(&str, &[(&str, &str, &[&str])])] = &[
        ("dt1", &[
            ("Greczula", "Half of me", &["Andreas Werling", "Karl Ivert", "Kian Sang", "Greczula"]),
            ("Jacqline", "Woman", &["Dino Medanhodzic", "Jimmy Jansson", "Moa \"Cazzi Opeia\" Carlebecker", "Thomas G:son"]),
            ("Noll2", "Berusade ord", &["Fredrik Andersson", "Jakob Westerlund", "Wilmer Öberg"]),
            ("Junior Lerin", "Copacabana boy", &["Fredrik Andersson"]),
            ("Indra", "Beautiful lie", &["Anderz Wrethov", "Indra", "Kristofer Strandberg", "Laurell Barker", "Robert Skowronski"]),
            ("A-Teens", "Iconic", &["Dino Medanhodzic", "Jimmy Jansson", "Lina Hansson", "Moa \"Cazzi Opeia\" Carlebecker", "Thomas G:son"]),
        ]),
        ("dt2", &[
            ("Arwin", "Glitter", &["Arwin Ismail", "Axel Schylström", "Dino Medanhodzic", "Melanie Wehbe", "Robert Skowronski"]),
            ("Laila Adèle", "Oxygen", &["Jonas Thander", "Laila Adèle", "Marcus Winther-John"]),
            ("Robin Bengtsson", "Honey honey", &["Gavin Jones", "Pär Westerlund", "Petter Tarland", "Robin Bengtsson"]),
            ("Felicia", "My system", &["Audun Agnar", "Emily Harbakk", "Felicia", "Julie Bergan", "Theresa Rex"]),
            ("Klara Almström", "Där hela världen väntar", &["Fredrik Sonefors", "Jimmy Jansson", "Klara Almström"]),
            ("Brandsta City Släckers", "Rakt in i elden", &["Anderz Wrethov", "Elin Wrethov", "Kristofer Strandberg", "Robert Skowronski"]),
        ]),
        ("dt3", &[
            ("Patrik Jean", "Dusk till dawn", &["David Lindgren Zacharias", "Joy Deb", "Melanie Wehbe", "Patrik Jean"]),
            ("Korslagda", "King of Rock'n roll", &["Andreas Werling", "Pedro Sanchez", "Kristofer Strandberg", "Stefan \"UBBE\" Sjur"]),
            ("Emilia Pantić", "Ingenting", &["Emilia Pantić", "Fredrik Andersson", "Jakob Westerlund", "Theodor Ström", "Wilmer Öberg"]),
            ("Medina", "Viva l'amor", &["Ali \"Alibrorsh\" Jammali", "Anderz Wrethov", "Dino Medanhodzic", "Jimmy \"Joker\" Thörnfeldt", "Sami Rekik"]),
            ("Eva Jumatate", "Selfish", &["Eva Jumatate", "Herman Gardarfve", "Marlene Strand", "Ruth Lindegren"]),
            ("Saga Ludvigsson", "Ain't today", &["Dino Medanhodzic", "Jimmy Jansson", "Johanna \"Dotter\" Jansson", "Saga Ludvigsson"]),
        ]),
        ("dt4", &[
            ("Cimberly", "Eternity", &["Cimberly-Malaika Wanyonyi", "David Lindgren Zacharias", "Dino Medanhodzic", "Melanie Wehbe"]),
            ("Timo Räisänen", "Ingenting är efter oss", &["Andreas \"Giri\" Lindbergh", "Jimmy \"Joker\" Thörnfeldt", "Joy Deb", "Lina Räisänen", "Linnea Deb", "Timo Räisänen"]),
            ("Meira Omar", "Dooset daram", &["Anderz Wrethov", "Jimmy \"Joker\" Thörnfeldt", "Laurell Barker", "Meira Omar"]),
            ("Felix Manu", "Hatar att jag älskar dig", &["Axel Schylström", "Felix Manu", "Fernand MP", "Karl Flyckt"]),
            ("Erika Jonsson", "Från landet", &["Amir Aly", "Erika Jonsson", "Mikael Karlsson"]),
            ("Smash Into Pieces", "Hollow", &["Benjamin Jennebo", "Chris Adam Hedman Sörbye", "Per Bergquist", "Philip Strand"]),
        ]),
        ("dt5", &[
            ("Alexa", "Tongue tied", &["Alexa", "Moonshine (Jonatan Gusmark & Ludvig Evers)", "Sunshine (Ellen Berg & Moa \"Cazzi Opeia\" Carlebecker)"]),
            ("Juliett", "Långt från alla andra", &["David Själin", "Elias Kask", "Herman Gardarfve", "Ludvig Alamanos", "Romeo Er-Melin", "Valter Wigren"]),
            ("Bladë", "Who you are", &["Isa Tengblad", "Josefina Carlbom"]),
            ("Lilla Al-Fadji", "Delulu", &["Daniel Réhn", "Edward af Sillén", "Lilla Al-Fadji", "Fredrik Sonefors", "Melanie Wehbe", "Mikaela Samuelsson"]),
            ("Vilhelm Buchaus", "Hearts don't lie", &["David Zandén", "Isa Molin", "Vilhelm Buchaus"]),
            ("Sanna Nielsen", "Waste your love", &["Jimmy Jansson", "Peter Boström", "Thomas G:son"]),
        ]),
    ];

    LINEUPS
        .iter()
        .flat_map(|(event_id, lineup)| {
            lineup
                .iter()
                .zip(1u8..)
                .map(move |((artist, song, songwriters), start_number)| RawEntry {
                    id: None,
                    event_id: (*event_id).to_owned(),
                    start_number,
                    artist: (*artist).to_owned(),
                    song: (*song).to_owned(),
                    songwriters: songwriters.iter().map(|name| (*name).to_owned()).collect(),
                    bio: None,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use time::macros::{date, offset, time};

    use super::*;

    #[test]
    fn builtin_season_has_seven_events_and_thirty_entries() {
        let config = AppConfig::builtin().unwrap();
        let catalog = config.catalog();

        assert_eq!(catalog.events().len(), 7);
        assert_eq!(catalog.events()[0].id, "dt1");
        assert_eq!(catalog.events()[6].id, "final");
        let total: usize = catalog
            .events()
            .iter()
            .map(|event| catalog.entries(&event.id).len())
            .sum();
        assert_eq!(total, 30);
        assert_eq!(catalog.entry("dt1", "dt1-6").unwrap().artist, "A-Teens");
        assert_eq!(config.utc_offset(), offset!(+1));
        assert_eq!(config.voting(), &VotingSettings::default());
    }

    #[test]
    fn finalkval_shares_the_dt5_evening() {
        let config = AppConfig::builtin().unwrap();
        let finalkval = config.catalog().event("finalkval").unwrap();

        assert_eq!(finalkval.kind, EventKind::FinalPreQualifier);
        assert_eq!(finalkval.date, date!(2026 - 02 - 28));
        assert_eq!(finalkval.time, time!(21:30));
    }

    #[test]
    fn tunables_only_file_keeps_the_builtin_catalog() {
        let config = AppConfig::from_json_str(
            r#"{ "voting": { "debounce_ms": 250, "max_transaction_attempts": 3 } }"#,
        )
        .unwrap();

        assert_eq!(config.voting().debounce, Duration::from_millis(250));
        assert_eq!(config.voting().max_transaction_attempts, 3);
        assert_eq!(config.voting().saved_display, Duration::from_millis(1_500));
        assert_eq!(config.catalog().events().len(), 7);
    }

    #[test]
    fn custom_catalog_replaces_the_builtin_one() {
        let config = AppConfig::from_json_str(
            r#"{
                "utc_offset": "+02:00",
                "events": [
                    { "id": "final", "kind": "final", "name": "Final", "date": "2027-03-13",
                      "time": "20:00", "city": "Stockholm", "venue": "Strawberry Arena" }
                ],
                "entries": [
                    { "event_id": "final", "start_number": 1, "artist": "A", "song": "S" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.utc_offset(), offset!(+2));
        assert_eq!(config.catalog().events().len(), 1);
        assert!(config.catalog().entry("final", "final-1").is_some());
    }

    #[test]
    fn malformed_schedule_is_rejected() {
        let result = AppConfig::from_json_str(
            r#"{ "events": [ { "id": "x", "kind": "final", "name": "X", "date": "31/01/2026",
                 "time": "20:00", "city": "C", "venue": "V" } ] }"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSchedule { field: "date", .. })
        ));
    }

    #[test]
    fn empty_event_list_is_rejected() {
        assert!(matches!(
            AppConfig::from_json_str(r#"{ "events": [] }"#),
            Err(ConfigError::EmptyCatalog)
        ));
    }

    #[test]
    fn zero_attempts_are_rejected() {
        assert!(matches!(
            AppConfig::from_json_str(r#"{ "voting": { "max_transaction_attempts": 0 } }"#),
            Err(ConfigError::InvalidVoting(_))
        ));
    }

    #[test]
    fn unparsable_json_is_a_parse_error() {
        assert!(matches!(
            AppConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse { .. })
        ));
    }
}

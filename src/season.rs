use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Days in a regular snow season (Nov 1 through Apr 30)
pub const SEASON_DAYS: u64 = 181;
/// Days in a season whose February has 29 days
pub const LEAP_SEASON_DAYS: u64 = 182;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeasonError {
    #[error("Unknown season '{label}'. Expected one of: {known}")]
    Unknown { label: String, known: String },
}

/// A winter forecast season, labelled by its two calendar years (e.g. `15-16`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Season {
    S15_16,
    S16_17,
    S17_18,
    S18_19,
    S19_20,
}

struct SeasonEntry {
    season: Season,
    label: &'static str,
    start: (i32, u32, u32),
    days: u64,
}

const SEASON_TABLE: [SeasonEntry; 5] = [
    SeasonEntry {
        season: Season::S15_16,
        label: "15-16",
        start: (2015, 11, 1),
        days: LEAP_SEASON_DAYS,
    },
    SeasonEntry {
        season: Season::S16_17,
        label: "16-17",
        start: (2016, 11, 1),
        days: SEASON_DAYS,
    },
    SeasonEntry {
        season: Season::S17_18,
        label: "17-18",
        start: (2017, 11, 1),
        days: SEASON_DAYS,
    },
    SeasonEntry {
        season: Season::S18_19,
        label: "18-19",
        start: (2018, 11, 1),
        days: SEASON_DAYS,
    },
    SeasonEntry {
        season: Season::S19_20,
        label: "19-20",
        start: (2019, 11, 1),
        days: LEAP_SEASON_DAYS,
    },
];

impl Season {
    pub const ALL: [Season; 5] = [
        Season::S15_16,
        Season::S16_17,
        Season::S17_18,
        Season::S18_19,
        Season::S19_20,
    ];

    fn entry(self) -> &'static SeasonEntry {
        // The table holds exactly one row per variant
        &SEASON_TABLE[self as usize]
    }

    pub fn label(self) -> &'static str {
        self.entry().label
    }

    /// First day of the season
    pub fn start_date(self) -> NaiveDate {
        let (y, m, d) = self.entry().start;
        NaiveDate::from_ymd_opt(y, m, d).expect("season table holds valid dates")
    }

    pub fn len_days(self) -> u64 {
        self.entry().days
    }

    /// Ordered calendar days the season should cover
    pub fn expected_days(self) -> Vec<NaiveDate> {
        let start = self.start_date();
        (0..self.len_days())
            .filter_map(|offset| start.checked_add_days(Days::new(offset)))
            .collect()
    }

    pub fn last_day(self) -> NaiveDate {
        let start = self.start_date();
        start
            .checked_add_days(Days::new(self.len_days() - 1))
            .expect("season end is within chrono's range")
    }
}

fn known_labels() -> String {
    SEASON_TABLE
        .iter()
        .map(|entry| entry.label)
        .collect::<Vec<_>>()
        .join(", ")
}

impl FromStr for Season {
    type Err = SeasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        SEASON_TABLE
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.season)
            .ok_or_else(|| SeasonError::Unknown {
                label: label.to_string(),
                known: known_labels(),
            })
    }
}

impl TryFrom<String> for Season {
    type Error = SeasonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Season> for String {
    fn from(season: Season) -> Self {
        season.label().to_string()
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

//! Year/season buckets used for destination folders and learned category timings.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    /// Spring = 3-5, Summer = 6-8, Fall = 9-11, everything else is Winter.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Fall,
            _ => Season::Winter,
        }
    }

    pub fn of<D: Datelike>(date: &D) -> Self {
        Self::from_month(date.month())
    }

    /// Month used when a season has to be turned back into a date.
    pub fn representative_month(self) -> u32 {
        match self {
            Season::Winter => 1,
            Season::Spring => 4,
            Season::Summer => 7,
            Season::Fall => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown season: {0}")]
pub struct ParseSeasonError(String);

impl FromStr for Season {
    type Err = ParseSeasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "winter" => Ok(Season::Winter),
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "fall" | "autumn" => Ok(Season::Fall),
            other => Err(ParseSeasonError(other.to_string())),
        }
    }
}

/// A (year, season) pair such as `2024-Fall`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub year: i32,
    pub season: Season,
}

impl Timing {
    pub fn new(year: i32, season: Season) -> Self {
        Self { year, season }
    }

    pub fn of(at: &DateTime<Utc>) -> Self {
        Self::new(at.year(), Season::of(at))
    }

    /// The 15th of the season's representative month, at midnight UTC.
    pub fn midpoint(self) -> Option<DateTime<Utc>> {
        NaiveDate::from_ymd_opt(self.year, self.season.representative_month(), 15)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    /// Folder label, e.g. `2024-Fall`.
    pub fn label(self) -> String {
        format!("{}-{}", self.year, self.season)
    }
}

#[derive(Debug, Error)]
#[error("expected YEAR-Season such as 2024-Fall, got {0:?}")]
pub struct ParseTimingError(String);

impl FromStr for Timing {
    type Err = ParseTimingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimingError(s.to_string());
        let (year, season) = s.trim().split_once(['-', ' ']).ok_or_else(err)?;
        let year = year.trim().parse().map_err(|_| err())?;
        let season = season.parse().map_err(|_| err())?;
        Ok(Self::new(year, season))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn months_map_to_seasons() {
        assert_eq!(Season::from_month(1), Season::Winter);
        assert_eq!(Season::from_month(4), Season::Spring);
        assert_eq!(Season::from_month(7), Season::Summer);
        assert_eq!(Season::from_month(10), Season::Fall);
    }

    #[test]
    fn season_boundaries() {
        assert_eq!(Season::from_month(2), Season::Winter);
        assert_eq!(Season::from_month(3), Season::Spring);
        assert_eq!(Season::from_month(5), Season::Spring);
        assert_eq!(Season::from_month(6), Season::Summer);
        assert_eq!(Season::from_month(8), Season::Summer);
        assert_eq!(Season::from_month(9), Season::Fall);
        assert_eq!(Season::from_month(11), Season::Fall);
        assert_eq!(Season::from_month(12), Season::Winter);
    }

    #[test]
    fn midpoint_falls_inside_its_season() {
        for season in [Season::Winter, Season::Spring, Season::Summer, Season::Fall] {
            let timing = Timing::new(2023, season);
            let mid = timing.midpoint().unwrap();
            assert_eq!(Timing::of(&mid), timing);
        }
    }

    #[test]
    fn parses_season_names_loosely() {
        assert_eq!("fall".parse::<Season>().unwrap(), Season::Fall);
        assert_eq!(" Autumn ".parse::<Season>().unwrap(), Season::Fall);
        assert!("monsoon".parse::<Season>().is_err());
        assert_eq!(Timing::new(2024, Season::Spring).label(), "2024-Spring");
    }

    #[test]
    fn timing_labels_parse_back() {
        assert_eq!("2024-Fall".parse::<Timing>().unwrap(), Timing::new(2024, Season::Fall));
        assert_eq!("2021 spring".parse::<Timing>().unwrap(), Timing::new(2021, Season::Spring));
        assert!("Fall".parse::<Timing>().is_err());
        assert!("20x4-Fall".parse::<Timing>().is_err());
    }
}

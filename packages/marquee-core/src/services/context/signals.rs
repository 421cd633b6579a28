//! Raw signal bag collected per location, plus derived time signals.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Phase of the local day, derived from the fractional hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    Dawn,
    Morning,
    Midday,
    Afternoon,
    GoldenHour,
    Evening,
    Night,
}

impl TimePeriod {
    /// Derives the period from the fractional local hour.
    #[must_use]
    pub fn from_hour(hour: f32) -> Self {
        match hour {
            h if (5.0..7.0).contains(&h) => Self::Dawn,
            h if (7.0..11.0).contains(&h) => Self::Morning,
            h if (11.0..14.0).contains(&h) => Self::Midday,
            h if (14.0..17.0).contains(&h) => Self::Afternoon,
            h if (17.0..19.0).contains(&h) => Self::GoldenHour,
            h if (19.0..22.0).contains(&h) => Self::Evening,
            _ => Self::Night,
        }
    }
}

/// Season, derived from the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    /// Derives the season from a 1-based month.
    #[must_use]
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Autumn,
            _ => Self::Winter,
        }
    }
}

/// Derived local-time signals. Always available.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSignals {
    /// Fractional local hour, e.g. 13.5 for 13:30.
    pub hour: f32,
    /// Weekday, 0 = Sunday.
    pub weekday: u8,
    pub is_weekend: bool,
    pub period: TimePeriod,
    pub season: Season,
}

impl TimeSignals {
    /// Computes time signals for an instant in the given zone (server-local
    /// when `None`).
    #[must_use]
    pub fn at(now: DateTime<Utc>, tz: Option<Tz>) -> Self {
        let (hour, weekday, month) = match tz {
            Some(tz) => {
                let local = now.with_timezone(&tz);
                (
                    local.hour() as f32 + local.minute() as f32 / 60.0,
                    local.weekday().num_days_from_sunday() as u8,
                    local.month(),
                )
            }
            None => {
                let local = now.with_timezone(&chrono::Local);
                (
                    local.hour() as f32 + local.minute() as f32 / 60.0,
                    local.weekday().num_days_from_sunday() as u8,
                    local.month(),
                )
            }
        };
        Self {
            hour,
            weekday,
            is_weekend: weekday == 0 || weekday == 6,
            period: TimePeriod::from_hour(hour),
            season: Season::from_month(month),
        }
    }
}

/// Latest weather reading for a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSignals {
    /// Condition tag as the upstream reports it (`sunny`, `rain`, ...).
    pub condition: String,
    pub temp_c: f32,
}

/// Sliding-window audio features from the streamed source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSignals {
    /// Mean level over the window, `[0, 1]`.
    pub level: f32,
    /// Spike frequency over the window, `[0, 1]`.
    pub spike_freq: f32,
    pub sustained_loud: bool,
}

/// Everything the processor consumes for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalBag {
    pub time: TimeSignals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherSignals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSignals>,
    /// Occupancy ratio `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<f32>,
    /// Staged security level `0..=3`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub people_count: Option<u32>,
    /// Calendar feed is stubbed: always empty.
    #[serde(default)]
    pub calendar: Vec<serde_json::Value>,
}

impl SignalBag {
    /// A bag holding only time signals.
    #[must_use]
    pub fn with_time(time: TimeSignals) -> Self {
        Self {
            time,
            weather: None,
            audio: None,
            occupancy: None,
            security_level: None,
            people_count: None,
            calendar: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn periods_cover_the_day() {
        assert_eq!(TimePeriod::from_hour(5.5), TimePeriod::Dawn);
        assert_eq!(TimePeriod::from_hour(8.0), TimePeriod::Morning);
        assert_eq!(TimePeriod::from_hour(12.0), TimePeriod::Midday);
        assert_eq!(TimePeriod::from_hour(15.0), TimePeriod::Afternoon);
        assert_eq!(TimePeriod::from_hour(18.0), TimePeriod::GoldenHour);
        assert_eq!(TimePeriod::from_hour(20.5), TimePeriod::Evening);
        assert_eq!(TimePeriod::from_hour(23.0), TimePeriod::Night);
        assert_eq!(TimePeriod::from_hour(2.0), TimePeriod::Night);
    }

    #[test]
    fn seasons_from_month() {
        assert_eq!(Season::from_month(4), Season::Spring);
        assert_eq!(Season::from_month(7), Season::Summer);
        assert_eq!(Season::from_month(10), Season::Autumn);
        assert_eq!(Season::from_month(12), Season::Winter);
        assert_eq!(Season::from_month(1), Season::Winter);
    }

    #[test]
    fn time_signals_respect_zone() {
        // Monday 2024-01-01 12:30 UTC is 21:30 in Tokyo.
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        let utc = TimeSignals::at(now, Some(chrono_tz::UTC));
        assert_eq!(utc.period, TimePeriod::Midday);
        assert_eq!(utc.weekday, 1);
        assert!(!utc.is_weekend);

        let tokyo = TimeSignals::at(now, Some(chrono_tz::Asia::Tokyo));
        assert_eq!(tokyo.period, TimePeriod::Evening);
        assert!((tokyo.hour - 21.5).abs() < 1e-6);
    }

    #[test]
    fn weekend_detection() {
        // Saturday 2024-01-06.
        let now = Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap();
        let t = TimeSignals::at(now, Some(chrono_tz::UTC));
        assert!(t.is_weekend);
        assert_eq!(t.weekday, 6);
    }
}

//! Schedules gate how often a resource is checked

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::resource::Resource;
use crate::types::ResourceRef;

/// Length of a schedule period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Never,
}

impl Period {
    fn length(self) -> Option<Duration> {
        match self {
            Self::Hourly => Some(Duration::hours(1)),
            Self::Daily => Some(Duration::days(1)),
            Self::Weekly => Some(Duration::weeks(1)),
            Self::Monthly => Some(Duration::days(30)),
            Self::Never => None,
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown schedule period '{other}'")),
        }
    }
}

/// A `Schedule[name]` resource
///
/// Matching is distance based: with `period = daily` and `repeat = 2` a
/// resource is due once twelve hours have passed since it was last checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

fn default_repeat() -> u32 {
    1
}

impl Schedule {
    /// A schedule with the given period, repeating once per period
    pub fn new(name: &str, period: Option<Period>) -> Self {
        Self {
            name: name.to_string(),
            period,
            repeat: 1,
        }
    }

    /// Allow `repeat` runs per period
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat.max(1);
        self
    }

    /// Whether a resource last checked at `previous` is due at `now`
    pub fn matches(&self, previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(period) = self.period else {
            return true;
        };
        let Some(length) = period.length() else {
            return false;
        };
        let Some(previous) = previous else {
            return true;
        };
        let interval = length / i32::try_from(self.repeat.max(1)).unwrap_or(i32::MAX);
        now - previous >= interval
    }
}

impl Resource for Schedule {
    fn reference(&self) -> ResourceRef {
        ResourceRef::new("Schedule", &self.name)
    }

    fn as_schedule(&self) -> Option<&Schedule> {
        Some(self)
    }
}

//! Immutable speed table and its validating builder.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, TimeZone, Timelike};

use super::error::SpeedTableError;
use crate::RegionId;

/// Number of days in a week; days are numbered from Sunday = 0.
pub const DAYS_PER_WEEK: u32 = 7;

/// Largest accepted minute-of-day breakpoint (inclusive).
pub const MAX_MINUTE_OF_DAY: u32 = 1440;

const DAY_SLOTS: usize = 7;

/// Day of week (Sunday = 0) and minute of day of an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeOfWeek {
    /// Day of week, Sunday = 0.
    pub day: u32,
    /// Minutes since local midnight.
    pub minute: u32,
}

impl TimeOfWeek {
    /// Derive the day and minute in the instant's own time zone.
    ///
    /// # Examples
    /// ```
    /// use chrono::DateTime;
    /// use eta_core::TimeOfWeek;
    ///
    /// // 2024-01-02 was a Tuesday.
    /// let at = DateTime::parse_from_rfc3339("2024-01-02T08:20:59+05:00").unwrap();
    /// let when = TimeOfWeek::from_datetime(&at);
    /// assert_eq!(when, TimeOfWeek { day: 2, minute: 500 });
    /// ```
    #[must_use]
    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        Self {
            day: at.weekday().num_days_from_sunday(),
            minute: at.hour() * 60 + at.minute(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Breakpoint {
    minute: u32,
    speed: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct RegionSchedule {
    // Sorted by minute, no duplicate minutes.
    days: [Vec<Breakpoint>; DAY_SLOTS],
}

/// Per-region, per-day step functions of speed.
///
/// Within a day the effective speed at a minute is the speed of the greatest
/// breakpoint at or before that minute. Minutes before the first breakpoint
/// have no speed.
///
/// # Examples
/// ```
/// use eta_core::{SpeedTable, TimeOfWeek};
///
/// let mut builder = SpeedTable::builder();
/// builder.insert(1, 2, 480, 20.0)?;
/// builder.insert(1, 2, 600, 25.0)?;
/// let table = builder.build();
///
/// assert_eq!(table.speed_at(1, TimeOfWeek { day: 2, minute: 500 }), Some(20.0));
/// assert_eq!(table.speed_at(1, TimeOfWeek { day: 2, minute: 700 }), Some(25.0));
/// assert_eq!(table.speed_at(1, TimeOfWeek { day: 2, minute: 100 }), None);
/// # Ok::<(), eta_core::SpeedTableError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedTable {
    regions: HashMap<RegionId, RegionSchedule>,
}

impl SpeedTable {
    /// Start building a table.
    #[must_use]
    pub fn builder() -> SpeedTableBuilder {
        SpeedTableBuilder::default()
    }

    /// Speed in effect for `region` at `when`, if any breakpoint covers it.
    #[must_use]
    pub fn speed_at(&self, region: RegionId, when: TimeOfWeek) -> Option<f64> {
        let day = usize::try_from(when.day).ok()?;
        let breakpoints = self.regions.get(&region)?.days.get(day)?;
        let after = breakpoints.partition_point(|bp| bp.minute <= when.minute);
        after
            .checked_sub(1)
            .and_then(|index| breakpoints.get(index))
            .map(|bp| bp.speed)
    }

    /// Whether `region` has any breakpoints.
    #[must_use]
    pub fn contains_region(&self, region: RegionId) -> bool {
        self.regions.contains_key(&region)
    }

    /// Number of regions with at least one breakpoint.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Total number of breakpoints across all regions and days.
    #[must_use]
    pub fn breakpoint_count(&self) -> usize {
        self.regions
            .values()
            .flat_map(|schedule| schedule.days.iter())
            .map(Vec::len)
            .sum()
    }

    /// Whether the table holds no breakpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Accumulates validated breakpoints into a [`SpeedTable`].
///
/// Inserting the same region, day and minute twice keeps the later speed.
#[derive(Debug, Clone, Default)]
pub struct SpeedTableBuilder {
    regions: HashMap<RegionId, [BTreeMap<u32, f64>; DAY_SLOTS]>,
}

impl SpeedTableBuilder {
    /// Record a breakpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SpeedTableError`] when the day, minute or speed is out of
    /// range. The builder is left unchanged in that case.
    pub fn insert(
        &mut self,
        region: RegionId,
        day: u32,
        minute: u32,
        speed: f64,
    ) -> Result<&mut Self, SpeedTableError> {
        if day >= DAYS_PER_WEEK {
            return Err(SpeedTableError::DayOutOfRange { day });
        }
        if minute > MAX_MINUTE_OF_DAY {
            return Err(SpeedTableError::MinuteOutOfRange { minute });
        }
        if !speed.is_finite() || speed < 0.0 {
            return Err(SpeedTableError::InvalidSpeed { speed });
        }
        let slot = usize::try_from(day)
            .ok()
            .and_then(|index| self.regions.entry(region).or_default().get_mut(index))
            .ok_or(SpeedTableError::DayOutOfRange { day })?;
        slot.insert(minute, speed);
        Ok(self)
    }

    /// Number of distinct breakpoints recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions
            .values()
            .flat_map(|days| days.iter())
            .map(BTreeMap::len)
            .sum()
    }

    /// Whether no breakpoints have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze the accumulated breakpoints into a table.
    #[must_use]
    pub fn build(self) -> SpeedTable {
        let regions = self
            .regions
            .into_iter()
            .map(|(region, days)| {
                let days = days.map(|day| {
                    day.into_iter()
                        .map(|(minute, speed)| Breakpoint { minute, speed })
                        .collect()
                });
                (region, RegionSchedule { days })
            })
            .collect();
        SpeedTable { regions }
    }
}

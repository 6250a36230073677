// src/backfill.rs

use anyhow::{anyhow, bail, Result};
use chrono::{Datelike, Months, NaiveDate};

/// Date cursor driving which yearly reports get fetched.
///
/// `from` moves by `step_years` after each fetch. A positive step walks
/// forward while `from <= to`, a negative step walks backward while
/// `from >= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillRange {
    from: NaiveDate,
    to: NaiveDate,
    step_years: i32,
}

impl BackfillRange {
    pub fn new(from: NaiveDate, to: NaiveDate, step_years: i32) -> Result<Self> {
        if step_years == 0 {
            bail!("backfill step must be a non-zero number of years");
        }
        Ok(Self {
            from,
            to,
            step_years,
        })
    }

    /// Both ends on the same day: exactly one year gets fetched.
    pub fn single(day: NaiveDate) -> Self {
        Self {
            from: day,
            to: day,
            step_years: 1,
        }
    }

    /// Current cursor position.
    pub fn cursor(&self) -> NaiveDate {
        self.from
    }

    pub fn until(&self) -> NaiveDate {
        self.to
    }

    pub fn step_years(&self) -> i32 {
        self.step_years
    }

    /// Whether the cursor is still inside the range.
    pub fn collect_more(&self) -> bool {
        if self.step_years > 0 {
            self.from <= self.to
        } else {
            self.from >= self.to
        }
    }

    /// Move `from` by one step.
    pub fn advance(&mut self) -> Result<()> {
        let months = Months::new(self.step_years.unsigned_abs() * 12);
        let next = if self.step_years > 0 {
            self.from.checked_add_months(months)
        } else {
            self.from.checked_sub_months(months)
        };
        self.from = next.ok_or_else(|| anyhow!("backfill cursor overflowed at {}", self.from))?;
        Ok(())
    }

    /// The report years this range yields, in fetch order.
    pub fn years(&self) -> Years {
        Years {
            cursor: *self,
            exhausted: false,
        }
    }
}

pub struct Years {
    cursor: BackfillRange,
    exhausted: bool,
}

impl Iterator for Years {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        if self.exhausted || !self.cursor.collect_more() {
            return None;
        }
        let year = self.cursor.from.year();
        // a cursor that cannot move any further ends the walk after this year
        self.exhausted = self.cursor.advance().is_err();
        Some(year)
    }
}

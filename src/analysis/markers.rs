//! NBER-dated U.S. recessions, for overlaying history on indicator series.

use chrono::{Datelike, NaiveDate};

/// (start, end, name, description), dates as (year, month) on the 1st.
const NBER_RECESSIONS: &[((i32, u32), (i32, u32), &str, &str)] = &[
    ((1969, 12), (1970, 11), "Nixon Recession", "Tight monetary policy"),
    ((1973, 11), (1975, 3), "Oil Crisis", "OPEC oil embargo"),
    ((1980, 1), (1980, 7), "Energy Crisis", "Iranian Revolution, oil prices"),
    ((1981, 7), (1982, 11), "Reagan Recession", "Volcker high interest rates"),
    ((1990, 7), (1991, 3), "Gulf War Recession", "Savings & loan crisis"),
    ((2001, 3), (2001, 11), "Dot-com Crash", "Tech bubble burst, 9/11"),
    ((2007, 12), (2009, 6), "Great Recession", "Financial crisis, housing bubble"),
    ((2020, 2), (2020, 4), "COVID-19 Recession", "Global pandemic"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct RecessionPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub name: &'static str,
    pub description: &'static str,
}

impl RecessionPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn duration_months(&self) -> i32 {
        let years = self.end.year() - self.start.year();
        years * 12 + self.end.month() as i32 - self.start.month() as i32
    }
}

pub fn nber_recessions() -> Vec<RecessionPeriod> {
    NBER_RECESSIONS
        .iter()
        .filter_map(|&((sy, sm), (ey, em), name, description)| {
            Some(RecessionPeriod {
                start: NaiveDate::from_ymd_opt(sy, sm, 1)?,
                end: NaiveDate::from_ymd_opt(ey, em, 1)?,
                name,
                description,
            })
        })
        .collect()
}

pub fn is_recession(date: NaiveDate) -> bool {
    nber_recessions().iter().any(|r| r.contains(date))
}

pub fn recession_name(date: NaiveDate) -> Option<&'static str> {
    nber_recessions().into_iter().find(|r| r.contains(date)).map(|r| r.name)
}

/// Recessions overlapping `[start, end]`; an open bound is unbounded.
pub fn periods_between(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<RecessionPeriod> {
    nber_recessions()
        .into_iter()
        .filter(|r| start.map_or(true, |s| r.end >= s))
        .filter(|r| end.map_or(true, |e| r.start <= e))
        .collect()
}

/// `true` for each date that falls inside a recession.
pub fn recession_mask<I>(dates: I) -> Vec<bool>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let periods = nber_recessions();
    dates
        .into_iter()
        .map(|d| periods.iter().any(|r| r.contains(d)))
        .collect()
}

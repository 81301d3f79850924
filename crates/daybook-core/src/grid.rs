//! Calendar grid arithmetic. Every
//! function here is pure: the caller
//! supplies the reference date, the
//! week-start convention and, where a
//! cell needs it, the current date.

use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  Weekday
};

use crate::datetime::local_today;

pub const MONTH_GRID_CELLS: usize = 42;
pub const DAYS_PER_WEEK: usize = 7;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct DayCell {
  pub date:           NaiveDate,
  pub is_other_month: bool,
  pub is_today:       bool
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGrid {
  pub year:  i32,
  pub month: u32,
  pub cells: Vec<DayCell>
}

impl MonthGrid {
  #[must_use]
  pub fn first_of_month(
    &self
  ) -> NaiveDate {
    first_day_of_month(
      self.year, self.month
    )
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum WeekSpan {
  Full,
  Work
}

impl WeekSpan {
  #[must_use]
  pub fn day_count(self) -> usize {
    match self {
      | WeekSpan::Full => 7,
      | WeekSpan::Work => 5
    }
  }
}

#[must_use]
pub fn week_start_day(
  start_on_monday: bool
) -> Weekday {
  if start_on_monday {
    Weekday::Mon
  } else {
    Weekday::Sun
  }
}

/// First day of the week containing
/// `date`. With a Monday start, a
/// Sunday belongs to the week that
/// began six days earlier.
#[must_use]
pub fn week_start(
  date: NaiveDate,
  start_on_monday: bool
) -> NaiveDate {
  let day_idx = date
    .weekday()
    .num_days_from_monday()
    as i64;
  let start_idx =
    week_start_day(start_on_monday)
      .num_days_from_monday()
      as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(date, -diff)
}

/// Six full weeks starting at the
/// week that holds the first of the
/// reference month.
#[must_use]
pub fn month_grid(
  reference: NaiveDate,
  start_on_monday: bool,
  today: NaiveDate
) -> MonthGrid {
  let first = first_day_of_month(
    reference.year(),
    reference.month()
  );
  let start =
    week_start(first, start_on_monday);

  let cells = (0..MONTH_GRID_CELLS)
    .map(|offset| {
      let date =
        add_days(start, offset as i64);
      DayCell {
        date,
        is_other_month: date.month()
          != reference.month(),
        is_today: date == today
      }
    })
    .collect();

  MonthGrid {
    year: reference.year(),
    month: reference.month(),
    cells
  }
}

/// Consecutive dates for a week view.
/// The work week always runs Monday to
/// Friday, whatever the week-start
/// setting says.
#[must_use]
pub fn week_grid(
  reference: NaiveDate,
  start_on_monday: bool,
  span: WeekSpan
) -> Vec<NaiveDate> {
  let start = match span {
    | WeekSpan::Full => {
      week_start(
        reference,
        start_on_monday
      )
    }
    | WeekSpan::Work => {
      week_start(reference, true)
    }
  };

  (0..span.day_count())
    .map(|offset| {
      add_days(start, offset as i64)
    })
    .collect()
}

#[must_use]
pub fn year_grid(
  year: i32,
  start_on_monday: bool,
  today: NaiveDate
) -> Vec<MonthGrid> {
  (1..=12)
    .map(|month| {
      month_grid(
        first_day_of_month(year, month),
        start_on_monday,
        today
      )
    })
    .collect()
}

#[must_use]
pub fn is_today(date: NaiveDate) -> bool {
  date == local_today()
}

#[must_use]
pub fn weekday_labels(
  start_on_monday: bool
) -> [&'static str; 7] {
  if start_on_monday {
    [
      "Mon", "Tue", "Wed", "Thu",
      "Fri", "Sat", "Sun"
    ]
  } else {
    [
      "Sun", "Mon", "Tue", "Wed",
      "Thu", "Fri", "Sat"
    ]
  }
}

#[must_use]
pub fn is_weekend(
  date: NaiveDate
) -> bool {
  matches!(
    date.weekday(),
    Weekday::Sat | Weekday::Sun
  )
}

pub fn shift_years(
  date: NaiveDate,
  years: i32
) -> NaiveDate {
  let year =
    date.year().saturating_add(years);
  let month = date.month();
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let total = date.year() * 12
    + date.month0() as i32
    + months;
  let year = total.div_euclid(12);
  let month =
    total.rem_euclid(12) as u32 + 1;
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

pub fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

#[cfg(test)]
mod tests {
  use chrono::{
    Datelike,
    NaiveDate,
    Weekday
  };

  use super::*;

  fn ymd(
    year: i32,
    month: u32,
    day: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(
      year, month, day
    )
    .expect("valid date")
  }

  #[test]
  fn march_2024_sunday_start_grid() {
    let grid = month_grid(
      ymd(2024, 3, 15),
      false,
      ymd(2024, 3, 15)
    );

    assert_eq!(
      grid.cells.len(),
      MONTH_GRID_CELLS
    );
    assert_eq!(
      grid.cells[0].date,
      ymd(2024, 2, 25)
    );
    assert_eq!(
      grid.cells[41].date,
      ymd(2024, 4, 6)
    );
    assert!(grid.cells[0].is_other_month);
    assert!(!grid.cells[5].is_other_month);
    assert_eq!(
      grid
        .cells
        .iter()
        .filter(|cell| cell.is_today)
        .count(),
      1
    );
  }

  #[test]
  fn month_grid_is_six_consecutive_weeks(
  ) {
    let mut reference = ymd(2023, 1, 1);
    let end = ymd(2025, 12, 31);

    while reference <= end {
      for start_on_monday in [false, true]
      {
        let grid = month_grid(
          reference,
          start_on_monday,
          reference
        );
        assert_eq!(
          grid.cells.len(),
          MONTH_GRID_CELLS
        );
        assert_eq!(
          grid.cells[0].date.weekday(),
          week_start_day(start_on_monday)
        );
        for pair in grid.cells.windows(2) {
          assert_eq!(
            add_days(pair[0].date, 1),
            pair[1].date
          );
        }
        assert!(grid.cells.iter().any(
          |cell| cell.date
            == grid.first_of_month()
        ));
        assert!(grid.cells.iter().any(
          |cell| cell.date
            == last_day_of_month(
              reference.year(),
              reference.month()
            )
        ));
      }
      reference = add_days(reference, 1);
    }
  }

  #[test]
  fn week_start_is_idempotent() {
    let mut date = ymd(2024, 1, 1);
    for _ in 0..60 {
      for start_on_monday in [false, true]
      {
        let start =
          week_start(date, start_on_monday);
        assert_eq!(
          week_start(
            start,
            start_on_monday
          ),
          start
        );
        assert!(start <= date);
      }
      date = add_days(date, 1);
    }
  }

  #[test]
  fn monday_start_maps_sunday_back_six_days(
  ) {
    let sunday = ymd(2024, 3, 17);
    assert_eq!(
      sunday.weekday(),
      Weekday::Sun
    );
    assert_eq!(
      week_start(sunday, true),
      ymd(2024, 3, 11)
    );
    assert_eq!(
      week_start(sunday, false),
      sunday
    );
  }

  #[test]
  fn work_week_runs_monday_to_friday() {
    let sunday = ymd(2024, 3, 17);
    for start_on_monday in [false, true] {
      let days = week_grid(
        sunday,
        start_on_monday,
        WeekSpan::Work
      );
      assert_eq!(days.len(), 5);
      assert_eq!(
        days[0].weekday(),
        Weekday::Mon
      );
      assert_eq!(
        days[4].weekday(),
        Weekday::Fri
      );
    }

    let full = week_grid(
      ymd(2024, 3, 13),
      false,
      WeekSpan::Full
    );
    assert_eq!(full.len(), 7);
    assert_eq!(full[0], ymd(2024, 3, 10));
  }

  #[test]
  fn year_grid_has_twelve_months() {
    let grids =
      year_grid(2024, true, ymd(2024, 6, 1));
    assert_eq!(grids.len(), 12);
    for (idx, grid) in
      grids.iter().enumerate()
    {
      assert_eq!(grid.year, 2024);
      assert_eq!(
        grid.month,
        idx as u32 + 1
      );
      assert_eq!(
        grid.cells.len(),
        MONTH_GRID_CELLS
      );
    }
  }

  #[test]
  fn is_today_follows_the_local_clock() {
    let today = local_today();
    assert!(is_today(today));
    assert!(!is_today(add_days(
      today, 1
    )));
    assert!(!is_today(add_days(
      today, -1
    )));
  }

  #[test]
  fn shifting_months_clamps_day() {
    assert_eq!(
      shift_months(ymd(2024, 1, 31), 1),
      ymd(2024, 2, 29)
    );
    assert_eq!(
      shift_months(ymd(2024, 1, 15), -1),
      ymd(2023, 12, 15)
    );
    assert_eq!(
      shift_years(ymd(2024, 2, 29), 1),
      ymd(2025, 2, 28)
    );
  }
}

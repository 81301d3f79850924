use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  Datelike,
  NaiveDate,
  NaiveDateTime,
  NaiveTime
};
use tracing::{
  debug,
  error
};

use crate::grid::{
  DayCell,
  WeekSpan,
  add_days,
  is_weekend,
  month_grid,
  shift_months,
  shift_years,
  week_grid,
  weekday_labels,
  year_grid
};
use crate::index::TaskIndex;
use crate::reminder::ReminderNotification;
use crate::settings::Settings;
use crate::task::{
  Task,
  TaskDraft,
  TaskId
};

pub const HOURS_PER_DAY: u32 = 24;
const DEFAULT_SLOT_HOUR: u32 = 9;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
)]
pub enum ViewMode {
  Month,
  Week,
  WorkWeek,
  Day,
  Agenda,
  Year
}

impl ViewMode {
  pub const ALL: [ViewMode; 6] = [
    ViewMode::Month,
    ViewMode::Week,
    ViewMode::WorkWeek,
    ViewMode::Day,
    ViewMode::Agenda,
    ViewMode::Year
  ];

  #[must_use]
  pub fn as_key(self) -> &'static str {
    match self {
      | ViewMode::Month => "month",
      | ViewMode::Week => "week",
      | ViewMode::WorkWeek => "workweek",
      | ViewMode::Day => "day",
      | ViewMode::Agenda => "agenda",
      | ViewMode::Year => "year"
    }
  }

  #[must_use]
  pub fn from_key(
    raw: &str
  ) -> Option<Self> {
    let normalized = raw
      .trim()
      .to_ascii_lowercase()
      .replace(['-', '_'], "");
    Self::ALL.into_iter().find(|view| {
      view.as_key() == normalized
    })
  }
}

impl FromStr for ViewMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    Self::from_key(s).ok_or_else(|| {
      let known = Self::ALL
        .iter()
        .map(|view| view.as_key())
        .collect::<Vec<_>>()
        .join(", ");
      anyhow!(
        "unknown view '{s}' (expected \
         one of: {known})"
      )
    })
  }
}

impl fmt::Display for ViewMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_key())
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Direction {
  Previous,
  Next
}

impl Direction {
  #[must_use]
  pub fn step(self) -> i32 {
    match self {
      | Direction::Previous => -1,
      | Direction::Next => 1
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct ViewState {
  pub current_view:   ViewMode,
  pub reference_date: NaiveDate
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderCell {
  pub date:           NaiveDate,
  pub hour:           Option<u32>,
  pub is_other_month: bool,
  pub is_today:       bool,
  pub tasks:          Vec<Task>
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSection {
  pub label: String,
  pub cells: Vec<RenderCell>
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderInstruction {
  pub view:           ViewMode,
  pub header:         String,
  pub weekday_labels: [&'static str; 7],
  pub sections:       Vec<RenderSection>
}

impl RenderInstruction {
  pub fn cells(
    &self
  ) -> impl Iterator<Item = &RenderCell>
  {
    self
      .sections
      .iter()
      .flat_map(|section| &section.cells)
  }
}

/// Whatever draws calendar output and
/// shows reminder notifications.
pub trait RenderSurface {
  fn draw_header(
    &mut self,
    instruction: &RenderInstruction
  ) -> anyhow::Result<()>;

  fn draw_section(
    &mut self,
    view: ViewMode,
    section: &RenderSection
  ) -> anyhow::Result<()>;

  fn notify(
    &mut self,
    notification: &ReminderNotification
  ) -> anyhow::Result<()>;
}

/// Hands an instruction to the surface
/// step by step. A failed step is
/// logged and skipped; the count of
/// failed steps is returned.
pub fn present(
  instruction: &RenderInstruction,
  surface: &mut dyn RenderSurface
) -> usize {
  let mut failed = 0;

  if let Err(error) =
    surface.draw_header(instruction)
  {
    error!(
      view = %instruction.view,
      error = %format!("{error:#}"),
      "failed drawing header"
    );
    failed += 1;
  }

  for section in &instruction.sections {
    if let Err(error) = surface
      .draw_section(
        instruction.view,
        section
      )
    {
      error!(
        view = %instruction.view,
        section = %section.label,
        error = %format!("{error:#}"),
        "failed drawing section; skipping"
      );
      failed += 1;
    }
  }

  debug!(
    view = %instruction.view,
    sections = instruction.sections.len(),
    failed,
    "render pass complete"
  );
  failed
}

/// Input coming back from a rendering
/// surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
  SelectDate {
    date: NaiveDate,
    hour: Option<u32>
  },
  OpenTask(TaskId),
  MoveTask {
    task_id: TaskId,
    date:    NaiveDate,
    time:    Option<NaiveTime>
  }
}

/// Blank form for a clicked cell; an
/// hour slot pre-fills `HH:00`.
#[must_use]
pub fn draft_for_slot(
  date: NaiveDate,
  hour: Option<u32>
) -> TaskDraft {
  let time = NaiveTime::from_hms_opt(
    hour
      .filter(|h| *h < HOURS_PER_DAY)
      .unwrap_or(DEFAULT_SLOT_HOUR),
    0,
    0
  )
  .unwrap_or(NaiveTime::MIN);
  TaskDraft::new("", date, time)
}

#[derive(Debug, Clone)]
pub struct ViewController {
  state: ViewState
}

impl ViewController {
  #[must_use]
  pub fn new(
    current_view: ViewMode,
    reference_date: NaiveDate
  ) -> Self {
    Self {
      state: ViewState {
        current_view,
        reference_date
      }
    }
  }

  #[must_use]
  pub fn state(&self) -> ViewState {
    self.state
  }

  pub fn switch_view(
    &mut self,
    view: ViewMode
  ) {
    debug!(from = %self.state.current_view, to = %view, "switching view");
    self.state.current_view = view;
  }

  pub fn go_to(
    &mut self,
    date: NaiveDate
  ) {
    self.state.reference_date = date;
  }

  pub fn navigate(
    &mut self,
    direction: Direction
  ) {
    let step = direction.step();
    let current =
      self.state.reference_date;
    let next = match self
      .state
      .current_view
    {
      | ViewMode::Month => {
        shift_months(current, step)
      }
      | ViewMode::Week
      | ViewMode::WorkWeek => {
        add_days(
          current,
          i64::from(step) * 7
        )
      }
      | ViewMode::Day => {
        add_days(current, i64::from(step))
      }
      | ViewMode::Year => {
        shift_years(current, step)
      }
      | ViewMode::Agenda => current
    };
    debug!(
      view = %self.state.current_view,
      from = %current,
      to = %next,
      "navigated"
    );
    self.state.reference_date = next;
  }

  /// Full render instruction for the
  /// current view; nothing is reused
  /// from earlier passes.
  #[must_use]
  pub fn build(
    &self,
    tasks: &TaskIndex,
    settings: &Settings,
    now: NaiveDateTime
  ) -> RenderInstruction {
    let today = now.date();
    let reference =
      self.state.reference_date;
    let start_on_monday =
      settings.start_on_monday;
    let view = self.state.current_view;

    let sections = match view {
      | ViewMode::Month => {
        let grid = month_grid(
          reference,
          start_on_monday,
          today
        );
        vec![RenderSection {
          label: reference
            .format("%B %Y")
            .to_string(),
          cells: grid
            .cells
            .iter()
            .map(|cell| {
              day_cell(cell, tasks, true)
            })
            .collect()
        }]
      }
      | ViewMode::Week => {
        week_grid(
          reference,
          start_on_monday,
          WeekSpan::Full
        )
        .into_iter()
        .filter(|date| {
          settings.show_weekends
            || !is_weekend(*date)
        })
        .map(|date| {
          hour_section(date, tasks, today)
        })
        .collect()
      }
      | ViewMode::WorkWeek => {
        week_grid(
          reference,
          start_on_monday,
          WeekSpan::Work
        )
        .into_iter()
        .map(|date| {
          hour_section(date, tasks, today)
        })
        .collect()
      }
      | ViewMode::Day => {
        vec![hour_section(
          reference, tasks, today
        )]
      }
      | ViewMode::Agenda => {
        vec![RenderSection {
          label: "Upcoming".to_string(),
          cells: tasks
            .upcoming_agenda(now)
            .into_iter()
            .map(|task| RenderCell {
              date:           task.date,
              hour:           Some(
                task.hour()
              ),
              is_other_month: false,
              is_today:       task.date
                == today,
              tasks:          vec![
                task.clone(),
              ]
            })
            .collect()
        }]
      }
      | ViewMode::Year => {
        year_grid(
          reference.year(),
          start_on_monday,
          today
        )
        .iter()
        .map(|grid| RenderSection {
          label: grid
            .first_of_month()
            .format("%B")
            .to_string(),
          cells: grid
            .cells
            .iter()
            .map(|cell| {
              day_cell(
                cell,
                tasks,
                !cell.is_other_month
              )
            })
            .collect()
        })
        .collect()
      }
    };

    RenderInstruction {
      view,
      header: header_label(
        view,
        reference,
        start_on_monday
      ),
      weekday_labels: weekday_labels(
        start_on_monday
      ),
      sections
    }
  }
}

fn day_cell(
  cell: &DayCell,
  tasks: &TaskIndex,
  attach_tasks: bool
) -> RenderCell {
  let day_tasks = if attach_tasks {
    tasks
      .tasks_on_date(cell.date)
      .into_iter()
      .cloned()
      .collect()
  } else {
    Vec::new()
  };
  RenderCell {
    date:           cell.date,
    hour:           None,
    is_other_month: cell.is_other_month,
    is_today:       cell.is_today,
    tasks:          day_tasks
  }
}

fn hour_section(
  date: NaiveDate,
  tasks: &TaskIndex,
  today: NaiveDate
) -> RenderSection {
  RenderSection {
    label: date
      .format("%a %b %-d")
      .to_string(),
    cells: (0..HOURS_PER_DAY)
      .map(|hour| RenderCell {
        date,
        hour: Some(hour),
        is_other_month: false,
        is_today: date == today,
        tasks: tasks
          .tasks_at_hour(date, hour)
          .into_iter()
          .cloned()
          .collect()
      })
      .collect()
  }
}

fn header_label(
  view: ViewMode,
  reference: NaiveDate,
  start_on_monday: bool
) -> String {
  match view {
    | ViewMode::Month => {
      reference
        .format("%B %Y")
        .to_string()
    }
    | ViewMode::Week
    | ViewMode::WorkWeek => {
      let span = if view
        == ViewMode::WorkWeek
      {
        WeekSpan::Work
      } else {
        WeekSpan::Full
      };
      let days = week_grid(
        reference,
        start_on_monday,
        span
      );
      let start = days
        .first()
        .copied()
        .unwrap_or(reference);
      let end = days
        .last()
        .copied()
        .unwrap_or(reference);
      format!(
        "{} - {}",
        start.format("%b %-d"),
        end.format("%b %-d, %Y")
      )
    }
    | ViewMode::Day => {
      reference
        .format("%A, %B %-d, %Y")
        .to_string()
    }
    | ViewMode::Agenda => {
      "Upcoming".to_string()
    }
    | ViewMode::Year => {
      reference.year().to_string()
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveDateTime,
    NaiveTime
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

  fn noon(date: NaiveDate) -> NaiveDateTime {
    date
      .and_hms_opt(12, 0, 0)
      .expect("valid time")
  }

  fn sample_tasks() -> TaskIndex {
    let created = noon(ymd(2024, 1, 1));
    let mk = |id, title: &str, date, hour| {
      Task::from_draft(
        id,
        TaskDraft::new(
          title,
          date,
          NaiveTime::from_hms_opt(
            hour, 0, 0
          )
          .expect("valid time")
        ),
        created
      )
    };
    TaskIndex::new(vec![
      mk(1, "standup", ymd(2024, 3, 15), 9),
      mk(2, "brunch", ymd(2024, 3, 16), 11),
      mk(3, "planning", ymd(2024, 4, 1), 9),
    ])
  }

  #[test]
  fn parses_every_view_key() {
    for view in ViewMode::ALL {
      assert_eq!(
        view.as_key().parse::<ViewMode>()
          .expect("known view"),
        view
      );
    }
    assert_eq!(
      ViewMode::from_key("Work-Week"),
      Some(ViewMode::WorkWeek)
    );
    assert!(
      "fortnight".parse::<ViewMode>().is_err()
    );
  }

  #[test]
  fn navigation_steps_by_view_granularity(
  ) {
    let start = ymd(2024, 1, 31);
    let cases = [
      (ViewMode::Month, ymd(2024, 2, 29)),
      (ViewMode::Week, ymd(2024, 2, 7)),
      (ViewMode::WorkWeek, ymd(2024, 2, 7)),
      (ViewMode::Day, ymd(2024, 2, 1)),
      (ViewMode::Year, ymd(2025, 1, 31)),
      (ViewMode::Agenda, start),
    ];

    for (view, expected) in cases {
      let mut controller =
        ViewController::new(view, start);
      controller.navigate(Direction::Next);
      assert_eq!(
        controller.state().reference_date,
        expected,
        "{view}"
      );
    }

    let mut controller = ViewController::new(
      ViewMode::Month,
      ymd(2024, 1, 15)
    );
    controller.navigate(Direction::Previous);
    assert_eq!(
      controller.state().reference_date,
      ymd(2023, 12, 15)
    );
  }

  #[test]
  fn month_instruction_attaches_day_tasks() {
    let controller = ViewController::new(
      ViewMode::Month,
      ymd(2024, 3, 15)
    );
    let instruction = controller.build(
      &sample_tasks(),
      &Settings::default(),
      noon(ymd(2024, 3, 15))
    );

    assert_eq!(instruction.header, "March 2024");
    assert_eq!(instruction.sections.len(), 1);
    assert_eq!(instruction.cells().count(), 42);
    assert_eq!(
      instruction.weekday_labels[0],
      "Sun"
    );

    let busy: Vec<NaiveDate> = instruction
      .cells()
      .filter(|cell| !cell.tasks.is_empty())
      .map(|cell| cell.date)
      .collect();
    assert_eq!(
      busy,
      vec![
        ymd(2024, 3, 15),
        ymd(2024, 3, 16),
        ymd(2024, 4, 1)
      ]
    );
    assert!(
      instruction
        .cells()
        .find(|cell| cell.is_today)
        .map(|cell| cell.date)
        == Some(ymd(2024, 3, 15))
    );
  }

  #[test]
  fn week_views_use_hour_slots() {
    let tasks = sample_tasks();
    let now = noon(ymd(2024, 3, 1));

    let week = ViewController::new(
      ViewMode::Week,
      ymd(2024, 3, 13)
    )
    .build(&tasks, &Settings::default(), now);
    assert_eq!(week.sections.len(), 7);
    assert_eq!(week.header, "Mar 10 - Mar 16, 2024");
    assert!(week
      .sections
      .iter()
      .all(|section| section.cells.len() == 24));
    let nine: Vec<&RenderCell> = week
      .cells()
      .filter(|cell| !cell.tasks.is_empty())
      .collect();
    assert_eq!(nine.len(), 2);
    assert_eq!(nine[0].hour, Some(9));
    assert_eq!(nine[1].hour, Some(11));

    let weekdays_only = Settings {
      show_weekends: false,
      ..Settings::default()
    };
    let trimmed = ViewController::new(
      ViewMode::Week,
      ymd(2024, 3, 13)
    )
    .build(&tasks, &weekdays_only, now);
    assert_eq!(trimmed.sections.len(), 5);

    let work = ViewController::new(
      ViewMode::WorkWeek,
      ymd(2024, 3, 13)
    )
    .build(&tasks, &Settings::default(), now);
    assert_eq!(work.sections.len(), 5);
    assert_eq!(work.header, "Mar 11 - Mar 15, 2024");
  }

  #[test]
  fn agenda_and_year_views() {
    let tasks = sample_tasks();
    let now = noon(ymd(2024, 3, 16));

    let agenda = ViewController::new(
      ViewMode::Agenda,
      ymd(2020, 1, 1)
    )
    .build(&tasks, &Settings::default(), now);
    let ids: Vec<TaskId> = agenda
      .cells()
      .flat_map(|cell| &cell.tasks)
      .map(|task| task.id)
      .collect();
    assert_eq!(ids, vec![3]);

    let year = ViewController::new(
      ViewMode::Year,
      ymd(2024, 7, 4)
    )
    .build(&tasks, &Settings::default(), now);
    assert_eq!(year.header, "2024");
    assert_eq!(year.sections.len(), 12);
    assert_eq!(year.sections[2].label, "March");
    let march_busy = year.sections[2]
      .cells
      .iter()
      .filter(|cell| !cell.tasks.is_empty())
      .count();
    assert_eq!(march_busy, 2);
    let feb_busy = year.sections[1]
      .cells
      .iter()
      .filter(|cell| !cell.tasks.is_empty())
      .count();
    assert_eq!(feb_busy, 0);
  }

  struct FlakySurface {
    drawn:   Vec<String>,
    fail_on: String
  }

  impl RenderSurface for FlakySurface {
    fn draw_header(
      &mut self,
      instruction: &RenderInstruction
    ) -> anyhow::Result<()> {
      self.drawn.push(
        instruction.header.clone()
      );
      Ok(())
    }

    fn draw_section(
      &mut self,
      _view: ViewMode,
      section: &RenderSection
    ) -> anyhow::Result<()> {
      if section.label == self.fail_on {
        anyhow::bail!("missing element");
      }
      self
        .drawn
        .push(section.label.clone());
      Ok(())
    }

    fn notify(
      &mut self,
      _notification: &ReminderNotification
    ) -> anyhow::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn failed_steps_do_not_abort_the_pass() {
    let instruction = ViewController::new(
      ViewMode::Year,
      ymd(2024, 1, 1)
    )
    .build(
      &TaskIndex::default(),
      &Settings::default(),
      noon(ymd(2024, 1, 1))
    );
    let mut surface = FlakySurface {
      drawn:   vec![],
      fail_on: "February".to_string()
    };

    let failed =
      present(&instruction, &mut surface);
    assert_eq!(failed, 1);
    assert_eq!(surface.drawn.len(), 12);
    assert_eq!(surface.drawn[0], "2024");
    assert!(!surface
      .drawn
      .contains(&"February".to_string()));
  }

  #[test]
  fn slot_drafts_prefill_hour() {
    let draft =
      draft_for_slot(ymd(2024, 3, 15), Some(14));
    assert_eq!(
      draft.time,
      NaiveTime::from_hms_opt(14, 0, 0)
        .expect("valid time")
    );
    let default =
      draft_for_slot(ymd(2024, 3, 15), None);
    assert_eq!(
      default.time,
      NaiveTime::from_hms_opt(9, 0, 0)
        .expect("valid time")
    );
    assert!(default.reminder_enabled);
  }
}

use anyhow::bail;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::datetime::{date_serde, instant_serde, time_serde};

pub type TaskId = i64;

pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 200;
pub const DEFAULT_DURATION_HOURS: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(with = "date_serde")]
    pub date: NaiveDate,

    #[serde(with = "time_serde")]
    pub time: NaiveTime,

    #[serde(default = "default_duration")]
    pub duration: f64,

    #[serde(default, alias = "reminder")]
    pub reminder_enabled: bool,

    #[serde(default)]
    pub do_not_disturb: bool,

    #[serde(with = "instant_serde")]
    pub created_at: NaiveDateTime,
}

fn default_duration() -> f64 {
    DEFAULT_DURATION_HOURS
}

impl Task {
    /// Builds a task from a draft that already passed [`TaskDraft::validate`].
    pub fn from_draft(id: TaskId, draft: TaskDraft, created_at: NaiveDateTime) -> Self {
        let draft = draft.normalized();
        Self {
            id,
            title: draft.title,
            description: draft.description,
            icon: draft.icon,
            date: draft.date,
            time: draft.time,
            duration: draft.duration,
            reminder_enabled: draft.reminder_enabled,
            do_not_disturb: draft.do_not_disturb,
            created_at,
        }
    }

    pub fn apply_draft(&mut self, draft: TaskDraft) {
        let draft = draft.normalized();
        self.title = draft.title;
        self.description = draft.description;
        self.icon = draft.icon;
        self.date = draft.date;
        self.time = draft.time;
        self.duration = draft.duration;
        self.reminder_enabled = draft.reminder_enabled;
        self.do_not_disturb = draft.do_not_disturb;
    }

    pub fn instant(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    pub fn occupies(&self, date: NaiveDate, time: NaiveTime) -> bool {
        self.date == date && self.time == time
    }
}

/// Form input for creating or editing a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration: f64,
    pub reminder_enabled: bool,
    pub do_not_disturb: bool,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            title: title.into(),
            description: None,
            icon: None,
            date,
            time,
            duration: DEFAULT_DURATION_HOURS,
            reminder_enabled: true,
            do_not_disturb: false,
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            icon: task.icon.clone(),
            date: task.date,
            time: task.time,
            duration: task.duration,
            reminder_enabled: task.reminder_enabled,
            do_not_disturb: task.do_not_disturb,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let title = self.title.trim();
        if title.is_empty() {
            bail!("task title cannot be empty");
        }
        if title.chars().count() > TITLE_MAX_CHARS {
            bail!("task title exceeds {TITLE_MAX_CHARS} characters");
        }
        if let Some(description) = self.description.as_deref()
            && description.chars().count() > DESCRIPTION_MAX_CHARS
        {
            bail!("task description exceeds {DESCRIPTION_MAX_CHARS} characters");
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            bail!("task duration must be a positive number of hours");
        }
        Ok(())
    }

    fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = non_empty(self.description);
        self.icon = non_empty(self.icon);
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

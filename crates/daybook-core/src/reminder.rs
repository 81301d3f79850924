use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::datetime::{date_serde, format_instant, instant_serde, time_serde};
use crate::task::{Task, TaskId};

pub const DEFAULT_LEAD_HOURS: u32 = 24;
/// One leap year.
pub const MAX_LEAD_HOURS: u32 = 24 * 366;
pub const POLL_INTERVAL: StdDuration = StdDuration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    Pending,
    Fired,
}

/// A reminder carries a snapshot of its task taken when it was scheduled.
/// Later edits to the task do not reach it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub task_id: TaskId,
    pub task_title: String,
    #[serde(with = "date_serde")]
    pub task_date: NaiveDate,
    #[serde(with = "time_serde")]
    pub task_time: NaiveTime,
    #[serde(with = "instant_serde")]
    pub reminder_time: NaiveDateTime,
    #[serde(default)]
    pub notified: bool,
    #[serde(default)]
    pub do_not_disturb: bool,
}

impl Reminder {
    pub fn id_for_task(task_id: TaskId) -> String {
        format!("reminder_{task_id}")
    }

    pub fn state(&self) -> ReminderState {
        if self.notified {
            ReminderState::Fired
        } else {
            ReminderState::Pending
        }
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        !self.notified && self.reminder_time <= now
    }

    pub fn task_instant(&self) -> NaiveDateTime {
        self.task_date.and_time(self.task_time)
    }

    /// Pending -> Fired. Returns false when already fired.
    pub fn fire(&mut self) -> bool {
        if self.notified {
            return false;
        }
        self.notified = true;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderNotification {
    pub reminder_id: String,
    pub task_id: TaskId,
    pub title: String,
    pub due: NaiveDateTime,
}

impl ReminderNotification {
    fn from_reminder(reminder: &Reminder) -> Self {
        Self {
            reminder_id: reminder.id.clone(),
            task_id: reminder.task_id,
            title: reminder.task_title.clone(),
            due: reminder.task_instant(),
        }
    }

    pub fn body(&self) -> String {
        format!("{}\nDue {}", self.title, format_instant(self.due))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub fired: Vec<String>,
    pub notifications: Vec<ReminderNotification>,
}

impl PollReport {
    pub fn suppressed(&self) -> usize {
        self.fired.len() - self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}

/// Reminder due `lead_hours` before the task, or `None` when that moment is
/// not strictly after `now` or falls outside the representable range.
pub fn derive_reminder(task: &Task, lead_hours: u32, now: NaiveDateTime) -> Option<Reminder> {
    let Some(reminder_time) = Duration::try_hours(i64::from(lead_hours))
        .and_then(|lead| task.instant().checked_sub_signed(lead))
    else {
        warn!(task_id = task.id, lead_hours, "reminder time out of range; not scheduling");
        return None;
    };
    if reminder_time <= now {
        debug!(
            task_id = task.id,
            reminder_time = %reminder_time,
            "reminder time already passed; not scheduling"
        );
        return None;
    }

    Some(Reminder {
        id: Reminder::id_for_task(task.id),
        task_id: task.id,
        task_title: task.title.clone(),
        task_date: task.date,
        task_time: task.time,
        reminder_time,
        notified: false,
        do_not_disturb: task.do_not_disturb,
    })
}

#[derive(Debug, Clone)]
pub struct ReminderScheduler {
    reminders: Vec<Reminder>,
    lead_hours: u32,
}

impl ReminderScheduler {
    pub fn new(reminders: Vec<Reminder>, lead_hours: u32) -> Self {
        Self {
            reminders,
            lead_hours,
        }
    }

    pub fn lead_hours(&self) -> u32 {
        self.lead_hours
    }

    pub fn set_lead_hours(&mut self, lead_hours: u32) {
        self.lead_hours = lead_hours;
    }

    pub fn reminders(&self) -> &[Reminder] {
        &self.reminders
    }

    pub fn get(&self, id: &str) -> Option<&Reminder> {
        self.reminders.iter().find(|reminder| reminder.id == id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Reminder> {
        self.reminders
            .iter()
            .filter(|reminder| reminder.state() == ReminderState::Pending)
    }

    #[instrument(skip(self, task, now), fields(task_id = task.id))]
    pub fn schedule(&mut self, task: &Task, now: NaiveDateTime) -> Option<&Reminder> {
        if !task.reminder_enabled {
            return None;
        }

        let id = Reminder::id_for_task(task.id);
        if self.get(&id).is_some() {
            debug!(reminder_id = %id, "reminder already scheduled");
            return None;
        }

        let reminder = derive_reminder(task, self.lead_hours, now)?;
        info!(
            reminder_id = %reminder.id,
            reminder_time = %reminder.reminder_time,
            "scheduled reminder"
        );
        self.reminders.push(reminder);
        self.reminders.last()
    }

    /// Fires every due pending reminder once. Do-not-disturb still moves the
    /// reminder to fired but keeps the notification back.
    #[instrument(skip(self))]
    pub fn poll_due(&mut self, now: NaiveDateTime, global_do_not_disturb: bool) -> PollReport {
        let mut report = PollReport::default();

        for reminder in &mut self.reminders {
            if !reminder.is_due(now) || !reminder.fire() {
                continue;
            }

            report.fired.push(reminder.id.clone());
            if global_do_not_disturb || reminder.do_not_disturb {
                debug!(reminder_id = %reminder.id, "reminder fired silently");
                continue;
            }
            report
                .notifications
                .push(ReminderNotification::from_reminder(reminder));
        }

        if !report.is_empty() {
            info!(
                fired = report.fired.len(),
                suppressed = report.suppressed(),
                "reminders fired"
            );
        }
        report
    }

    pub fn remove_for_task(&mut self, task_id: TaskId) -> usize {
        let before = self.reminders.len();
        self.reminders.retain(|reminder| reminder.task_id != task_id);
        let removed = before - self.reminders.len();
        debug!(task_id, removed, "removed reminders for task");
        removed
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.reminders.len();
        self.reminders.retain(|reminder| reminder.id != id);
        before != self.reminders.len()
    }
}

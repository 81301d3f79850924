use anyhow::{Context, anyhow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info, instrument, warn};

use crate::datastore::{StorageAdapter, StorageKey, load_record, save_record};
use crate::index::TaskIndex;
use crate::reminder::{PollReport, Reminder, ReminderScheduler};
use crate::settings::{SettingUpdate, Settings};
use crate::task::{Task, TaskDraft, TaskId};
use crate::view::{
    Direction, RenderInstruction, RenderSurface, SurfaceEvent, ViewController, ViewMode,
    draft_for_slot, present,
};

/// A drag-and-drop target that already holds another task.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveConflict {
    pub task: Task,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub existing: Vec<Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    Declined,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Compose(TaskDraft),
    Details(Task),
    Move(MoveOutcome),
}

/// The calendar application state: storage, tasks, reminders, settings and
/// the view controller. Every mutation persists best-effort before returning.
#[derive(Debug)]
pub struct Calendar<S: StorageAdapter> {
    storage: S,
    tasks: TaskIndex,
    reminders: ReminderScheduler,
    settings: Settings,
    view: ViewController,
}

impl<S: StorageAdapter> Calendar<S> {
    #[instrument(skip(storage))]
    pub fn load(storage: S, today: NaiveDate) -> Self {
        let tasks: Vec<Task> = read_or_default(&storage, StorageKey::Tasks);
        let reminders: Vec<Reminder> = read_or_default(&storage, StorageKey::Reminders);
        let settings = read_or_default::<Settings, _>(&storage, StorageKey::Settings).sanitized();

        info!(
            tasks = tasks.len(),
            reminders = reminders.len(),
            "loaded calendar"
        );

        Self {
            storage,
            tasks: TaskIndex::new(tasks),
            reminders: ReminderScheduler::new(reminders, settings.reminder_lead_hours),
            settings,
            view: ViewController::new(ViewMode::Month, today),
        }
    }

    /// Re-reads tasks, reminders and settings so records written by another
    /// process since `load` are not overwritten. A record that fails to read
    /// keeps its in-memory value.
    #[instrument(skip(self))]
    pub fn reload_records(&mut self) {
        if let Some(settings) = reread::<Settings, _>(&self.storage, StorageKey::Settings) {
            self.settings = settings.sanitized();
        }
        if let Some(tasks) = reread::<Vec<Task>, _>(&self.storage, StorageKey::Tasks) {
            self.tasks = TaskIndex::new(tasks);
        }
        let reminders = reread::<Vec<Reminder>, _>(&self.storage, StorageKey::Reminders)
            .unwrap_or_else(|| self.reminders.reminders().to_vec());
        self.reminders = ReminderScheduler::new(reminders, self.settings.reminder_lead_hours);

        debug!(
            tasks = self.tasks.len(),
            reminders = self.reminders.reminders().len(),
            "reloaded records"
        );
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn tasks(&self) -> &TaskIndex {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn view(&self) -> &ViewController {
        &self.view
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn add_task(&mut self, draft: TaskDraft, now: NaiveDateTime) -> anyhow::Result<TaskId> {
        draft.validate().context("task rejected")?;

        let id = self.tasks.next_id(now);
        let task = Task::from_draft(id, draft, now);
        self.reminders.schedule(&task, now);
        self.tasks.insert(task)?;

        self.persist_tasks();
        self.persist_reminders();
        info!(id, "task added");
        Ok(id)
    }

    /// Outstanding reminders keep the snapshot taken when they were
    /// scheduled; only a task that had none gets a new one here.
    #[instrument(skip(self, draft))]
    pub fn update_task(
        &mut self,
        id: TaskId,
        draft: TaskDraft,
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        draft.validate().context("task rejected")?;

        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        task.apply_draft(draft);
        let updated = task.clone();

        let scheduled = self.reminders.schedule(&updated, now).is_some();
        self.persist_tasks();
        if scheduled {
            self.persist_reminders();
        }
        info!(id, "task updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_task(&mut self, id: TaskId) -> anyhow::Result<Task> {
        let task = self
            .tasks
            .remove(id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        let removed = self.reminders.remove_for_task(id);

        self.persist_tasks();
        self.persist_reminders();
        info!(id, reminders_removed = removed, "task deleted");
        Ok(task)
    }

    /// Moves a task to another date (and optionally time). When the target
    /// slot is taken, `confirm` decides; declining changes nothing.
    #[instrument(skip(self, confirm))]
    pub fn move_task<F>(
        &mut self,
        id: TaskId,
        date: NaiveDate,
        time: Option<NaiveTime>,
        confirm: F,
    ) -> anyhow::Result<MoveOutcome>
    where
        F: FnOnce(&MoveConflict) -> bool,
    {
        let task = self
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        let time = time.unwrap_or(task.time);

        let existing: Vec<Task> = self
            .tasks
            .conflicts(date, time, Some(id))
            .into_iter()
            .cloned()
            .collect();
        if !existing.is_empty() {
            let conflict = MoveConflict {
                task,
                date,
                time,
                existing,
            };
            warn!(
                id,
                date = %date,
                time = %time,
                occupied_by = conflict.existing.len(),
                "move target already occupied"
            );
            if !confirm(&conflict) {
                info!(id, "move declined");
                return Ok(MoveOutcome::Declined);
            }
        }

        if let Some(task) = self.tasks.get_mut(id) {
            task.date = date;
            task.time = time;
        }
        self.persist_tasks();
        info!(id, date = %date, time = %time, "task moved");
        Ok(MoveOutcome::Moved)
    }

    pub fn remove_reminder(&mut self, reminder_id: &str) -> anyhow::Result<()> {
        if !self.reminders.remove(reminder_id) {
            return Err(anyhow!("reminder not found: {reminder_id}"));
        }
        self.persist_reminders();
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn update_setting(&mut self, update: SettingUpdate) -> bool {
        let changed = self.settings.apply(update);
        if let SettingUpdate::ReminderLeadHours(_) = update {
            self.reminders
                .set_lead_hours(self.settings.reminder_lead_hours);
        }
        self.persist_settings();
        debug!(changed, "setting updated");
        changed
    }

    #[instrument(skip(self))]
    pub fn poll_reminders(&mut self, now: NaiveDateTime) -> PollReport {
        let report = self
            .reminders
            .poll_due(now, self.settings.global_do_not_disturb);
        if !report.is_empty() {
            self.persist_reminders();
        }
        report
    }

    pub fn switch_view(&mut self, view: ViewMode) {
        self.view.switch_view(view);
    }

    pub fn navigate(&mut self, direction: Direction) {
        self.view.navigate(direction);
    }

    pub fn go_to(&mut self, date: NaiveDate) {
        self.view.go_to(date);
    }

    pub fn build_view(&self, now: NaiveDateTime) -> RenderInstruction {
        self.view.build(&self.tasks, &self.settings, now)
    }

    /// Builds and presents the current view; returns the failed step count.
    pub fn render(&self, surface: &mut dyn RenderSurface, now: NaiveDateTime) -> usize {
        present(&self.build_view(now), surface)
    }

    /// Polls reminders and forwards the emitted notifications to `surface`.
    pub fn poll_and_notify(
        &mut self,
        surface: &mut dyn RenderSurface,
        now: NaiveDateTime,
    ) -> PollReport {
        let report = self.poll_reminders(now);
        for notification in &report.notifications {
            if let Err(error) = surface.notify(notification) {
                warn!(
                    reminder_id = %notification.reminder_id,
                    error = %format!("{error:#}"),
                    "failed to show reminder notification"
                );
            }
        }
        report
    }

    pub fn handle_event<F>(&mut self, event: SurfaceEvent, confirm: F) -> anyhow::Result<EventOutcome>
    where
        F: FnOnce(&MoveConflict) -> bool,
    {
        match event {
            SurfaceEvent::SelectDate { date, hour } => {
                Ok(EventOutcome::Compose(draft_for_slot(date, hour)))
            }
            SurfaceEvent::OpenTask(id) => self
                .tasks
                .get(id)
                .cloned()
                .map(EventOutcome::Details)
                .ok_or_else(|| anyhow!("task not found: {id}")),
            SurfaceEvent::MoveTask { task_id, date, time } => self
                .move_task(task_id, date, time, confirm)
                .map(EventOutcome::Move),
        }
    }

    fn persist_tasks(&mut self) {
        write_best_effort(&mut self.storage, StorageKey::Tasks, self.tasks.as_slice());
    }

    fn persist_reminders(&mut self) {
        write_best_effort(
            &mut self.storage,
            StorageKey::Reminders,
            self.reminders.reminders(),
        );
    }

    fn persist_settings(&mut self) {
        write_best_effort(&mut self.storage, StorageKey::Settings, &self.settings);
    }
}

fn read_or_default<T, S>(storage: &S, key: StorageKey) -> T
where
    T: serde::de::DeserializeOwned + Default,
    S: StorageAdapter,
{
    match load_record(storage, key) {
        Ok(Some(value)) => value,
        Ok(None) => {
            debug!(key = key.as_key(), "no stored record; using defaults");
            T::default()
        }
        Err(error) => {
            warn!(
                key = key.as_key(),
                error = %format!("{error:#}"),
                "failed reading stored record; using defaults"
            );
            T::default()
        }
    }
}

fn reread<T, S>(storage: &S, key: StorageKey) -> Option<T>
where
    T: serde::de::DeserializeOwned + Default,
    S: StorageAdapter,
{
    match load_record(storage, key) {
        Ok(value) => Some(value.unwrap_or_default()),
        Err(error) => {
            warn!(
                key = key.as_key(),
                error = %format!("{error:#}"),
                "failed re-reading stored record; keeping current state"
            );
            None
        }
    }
}

fn write_best_effort<T, S>(storage: &mut S, key: StorageKey, value: &T)
where
    T: serde::Serialize + ?Sized,
    S: StorageAdapter,
{
    if let Err(error) = save_record(storage, key, value) {
        warn!(
            key = key.as_key(),
            error = %format!("{error:#}"),
            "failed saving record; in-memory state kept"
        );
    }
}

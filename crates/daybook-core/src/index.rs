use anyhow::bail;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, warn};

use crate::task::{Task, TaskId};

/// Insertion-ordered task collection. Lookups are linear scans; the
/// expected collection size is a personal calendar.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex {
    tasks: Vec<Task>,
}

impl TaskIndex {
    pub fn new(tasks: Vec<Task>) -> Self {
        let mut index = Self::default();
        for task in tasks {
            if index.get(task.id).is_some() {
                warn!(id = task.id, "dropping stored task with duplicate id");
                continue;
            }
            index.tasks.push(task);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn as_slice(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    /// Creation-time id: epoch milliseconds of `now`, bumped past the largest
    /// id already present so two tasks created in the same millisecond stay
    /// distinct.
    pub fn next_id(&self, now: NaiveDateTime) -> TaskId {
        let candidate = now.and_utc().timestamp_millis();
        let max_existing = self.tasks.iter().map(|task| task.id).max();
        match max_existing {
            Some(max) if max >= candidate => max + 1,
            _ => candidate,
        }
    }

    pub fn insert(&mut self, task: Task) -> anyhow::Result<()> {
        if self.get(task.id).is_some() {
            bail!("task id {} already exists", task.id);
        }
        debug!(id = task.id, date = %task.date, time = %task.time, "indexed task");
        self.tasks.push(task);
        Ok(())
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let idx = self.tasks.iter().position(|task| task.id == id)?;
        Some(self.tasks.remove(idx))
    }

    pub fn tasks_on_date(&self, date: NaiveDate) -> Vec<&Task> {
        self.tasks.iter().filter(|task| task.date == date).collect()
    }

    pub fn tasks_at_hour(&self, date: NaiveDate, hour: u32) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.date == date && task.hour() == hour)
            .collect()
    }

    pub fn conflicts(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        exclude: Option<TaskId>,
    ) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| Some(task.id) != exclude && task.occupies(date, time))
            .collect()
    }

    /// Advisory only: callers decide whether a shared slot blocks anything.
    pub fn detect_conflict(&self, date: NaiveDate, time: NaiveTime, exclude: Option<TaskId>) -> bool {
        !self.conflicts(date, time, exclude).is_empty()
    }

    pub fn upcoming_agenda(&self, now: NaiveDateTime) -> Vec<&Task> {
        let mut upcoming: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| task.instant() >= now)
            .collect();
        // stable: equal instants keep insertion order
        upcoming.sort_by_key(|task| task.instant());
        upcoming
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    use super::*;
    use crate::task::TaskDraft;

    fn at(date: &str, time: &str) -> (NaiveDate, NaiveTime) {
        (
            NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("valid date"),
            NaiveTime::parse_from_str(time, "%H:%M").expect("valid time"),
        )
    }

    fn instant(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").expect("valid instant")
    }

    fn task(id: TaskId, title: &str, date: &str, time: &str) -> Task {
        let (date, time) = at(date, time);
        Task::from_draft(
            id,
            TaskDraft::new(title, date, time),
            instant("2024-01-01T00:00:00"),
        )
    }

    fn sample() -> TaskIndex {
        TaskIndex::new(vec![
            task(1, "standup", "2024-03-15", "09:00"),
            task(2, "lunch", "2024-03-15", "12:30"),
            task(3, "review", "2024-03-15", "09:45"),
            task(4, "gym", "2024-03-16", "09:00"),
        ])
    }

    #[test]
    fn looks_up_by_date_and_hour() {
        let index = sample();
        let (day, _) = at("2024-03-15", "00:00");

        let titles: Vec<&str> = index
            .tasks_on_date(day)
            .iter()
            .map(|task| task.title.as_str())
            .collect();
        assert_eq!(titles, vec!["standup", "lunch", "review"]);

        let nine: Vec<TaskId> = index.tasks_at_hour(day, 9).iter().map(|t| t.id).collect();
        assert_eq!(nine, vec![1, 3]);
        assert!(index.tasks_at_hour(day, 10).is_empty());
    }

    #[test]
    fn conflict_ignores_the_moving_task() {
        let index = sample();
        let (date, time) = at("2024-03-15", "09:00");

        assert!(index.detect_conflict(date, time, Some(4)));
        assert!(!index.detect_conflict(date, time, Some(1)));

        let (other_date, _) = at("2024-03-17", "09:00");
        assert!(!index.detect_conflict(other_date, time, None));
    }

    #[test]
    fn agenda_is_sorted_and_stable() {
        let mut index = sample();
        index
            .insert(task(5, "second standup", "2024-03-15", "09:00"))
            .expect("insert");

        let ids: Vec<TaskId> = index
            .upcoming_agenda(instant("2024-03-15T09:00:00"))
            .iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(ids, vec![1, 5, 3, 2, 4]);

        let later: Vec<TaskId> = index
            .upcoming_agenda(instant("2024-03-15T10:00:00"))
            .iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(later, vec![2, 4]);
    }

    #[test]
    fn ids_stay_unique() {
        let mut index = sample();
        assert!(index.insert(task(2, "dup", "2024-03-20", "10:00")).is_err());

        let now = instant("1970-01-01T00:00:00");
        assert_eq!(index.next_id(now), 5);

        let later = instant("2024-03-01T00:00:00");
        assert_eq!(index.next_id(later), later.and_utc().timestamp_millis());

        assert_eq!(index.remove(2).map(|task| task.id), Some(2));
        assert_eq!(index.len(), 3);
        assert!(index.remove(2).is_none());
    }
}

use std::io::{self, IsTerminal, Write};

use chrono::{Datelike, NaiveDateTime};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_date, format_instant, format_time};
use crate::grid::DAYS_PER_WEEK;
use crate::reminder::{Reminder, ReminderNotification, ReminderState};
use crate::settings::Settings;
use crate::task::Task;
use crate::view::{RenderCell, RenderInstruction, RenderSection, RenderSurface, ViewMode};

const CELL_WIDTH: usize = 5;

/// Terminal rendering surface.
#[derive(Debug)]
pub struct Renderer<W: Write> {
    out: W,
    color: bool,
    weekday_labels: [&'static str; 7],
}

impl Renderer<io::Stdout> {
    pub fn stdout(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.color_enabled()? && io::stdout().is_terminal();
        Ok(Self::with_color(io::stdout(), color))
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(cfg: &Config, out: W) -> anyhow::Result<Self> {
        Ok(Self::with_color(out, cfg.color_enabled()?))
    }

    pub fn plain(out: W) -> Self {
        Self::with_color(out, false)
    }

    fn with_color(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            weekday_labels: ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"],
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn message(&mut self, text: &str) -> anyhow::Result<()> {
        writeln!(self.out, "{text}")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let id = self.paint(&task.id.to_string(), "33");
        writeln!(self.out, "id        {id}")?;
        writeln!(self.out, "title     {}", task_label(task))?;
        if let Some(description) = &task.description {
            writeln!(self.out, "desc      {description}")?;
        }
        writeln!(self.out, "date      {}", format_date(task.date))?;
        writeln!(self.out, "time      {}", format_time(task.time))?;
        writeln!(self.out, "duration  {}h", task.duration)?;
        writeln!(self.out, "reminder  {}", on_off(task.reminder_enabled))?;
        writeln!(self.out, "dnd       {}", on_off(task.do_not_disturb))?;
        writeln!(self.out, "created   {}", format_instant(task.created_at))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, reminders, now))]
    pub fn print_reminders(
        &mut self,
        reminders: &[Reminder],
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        if reminders.is_empty() {
            writeln!(self.out, "No reminders.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Task".to_string(),
            "Remind at".to_string(),
            "Due".to_string(),
            "State".to_string(),
        ];

        let mut rows = Vec::with_capacity(reminders.len());
        for reminder in reminders {
            let state = match reminder.state() {
                ReminderState::Fired => "fired".to_string(),
                ReminderState::Pending if reminder.is_due(now) => self.paint("due", "31"),
                ReminderState::Pending if reminder.do_not_disturb => "pending (dnd)".to_string(),
                ReminderState::Pending => "pending".to_string(),
            };
            rows.push(vec![
                self.paint(&reminder.id, "33"),
                reminder.task_title.clone(),
                format_instant(reminder.reminder_time),
                format_instant(reminder.task_instant()),
                state,
            ]);
        }

        write_table(&mut self.out, headers, rows)
    }

    pub fn print_settings(&mut self, settings: &Settings) -> anyhow::Result<()> {
        let entries = settings.entries();
        let width = entries
            .iter()
            .map(|(key, _)| UnicodeWidthStr::width(*key))
            .max()
            .unwrap_or(0);
        for (key, value) in entries {
            writeln!(self.out, "{key:width$}  {value}")?;
        }
        Ok(())
    }

    fn draw_day_grid(&mut self, section: &RenderSection, list_tasks: bool) -> anyhow::Result<()> {
        let labels = self
            .weekday_labels
            .iter()
            .map(|label| format!("{label:>width$}", width = CELL_WIDTH - 1))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(self.out, "{labels}")?;

        for week in section.cells.chunks(DAYS_PER_WEEK) {
            let row = week
                .iter()
                .map(|cell| self.day_cell_text(cell))
                .collect::<Vec<_>>()
                .join("");
            writeln!(self.out, "{}", row.trim_end())?;
        }

        if list_tasks {
            for cell in section.cells.iter().filter(|cell| !cell.tasks.is_empty()) {
                for task in &cell.tasks {
                    writeln!(
                        self.out,
                        "  {} {}  {}",
                        cell.date.format("%b %e"),
                        format_time(task.time),
                        task_label(task)
                    )?;
                }
            }
        }
        Ok(())
    }

    fn day_cell_text(&self, cell: &RenderCell) -> String {
        let marker = if cell.tasks.is_empty() { ' ' } else { '*' };
        let day = cell.date.day();
        let text = if cell.is_today && !self.color {
            format!("[{day:>2}]{marker}")
        } else {
            format!(" {day:>2} {marker}")
        };
        if cell.is_today {
            self.paint(&text, "7")
        } else if cell.is_other_month {
            self.paint(&text, "2")
        } else {
            text
        }
    }

    fn draw_hours(&mut self, section: &RenderSection) -> anyhow::Result<()> {
        let busy: Vec<&RenderCell> = section
            .cells
            .iter()
            .filter(|cell| !cell.tasks.is_empty())
            .collect();
        if busy.is_empty() {
            writeln!(self.out, "  (no events)")?;
            return Ok(());
        }
        for cell in busy {
            for task in &cell.tasks {
                let time = self.paint(&format_time(task.time), "36");
                writeln!(self.out, "  {time}  {} ({}h)", task_label(task), task.duration)?;
            }
        }
        Ok(())
    }

    fn draw_agenda(&mut self, section: &RenderSection) -> anyhow::Result<()> {
        if section.cells.is_empty() {
            writeln!(self.out, "No upcoming tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Date".to_string(),
            "Time".to_string(),
            "Task".to_string(),
            "Flags".to_string(),
        ];
        let mut rows = Vec::new();
        for cell in &section.cells {
            for task in &cell.tasks {
                let date = format_date(task.date);
                let date = if cell.is_today {
                    self.paint(&date, "1")
                } else {
                    date
                };
                let mut flags = Vec::new();
                if task.reminder_enabled {
                    flags.push("reminder");
                }
                if task.do_not_disturb {
                    flags.push("dnd");
                }
                rows.push(vec![
                    self.paint(&task.id.to_string(), "33"),
                    date,
                    format_time(task.time),
                    task_label(task),
                    flags.join(","),
                ]);
            }
        }
        write_table(&mut self.out, headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

impl<W: Write> RenderSurface for Renderer<W> {
    fn draw_header(&mut self, instruction: &RenderInstruction) -> anyhow::Result<()> {
        self.weekday_labels = instruction.weekday_labels;
        let header = self.paint(&instruction.header, "1");
        writeln!(self.out, "{header}")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn draw_section(&mut self, view: ViewMode, section: &RenderSection) -> anyhow::Result<()> {
        match view {
            ViewMode::Month => self.draw_day_grid(section, true),
            ViewMode::Year => {
                let label = self.paint(&section.label, "1");
                writeln!(self.out, "{label}")?;
                self.draw_day_grid(section, false)?;
                writeln!(self.out)?;
                Ok(())
            }
            ViewMode::Week | ViewMode::WorkWeek | ViewMode::Day => {
                let label = self.paint(&section.label, "1");
                writeln!(self.out, "{label}")?;
                self.draw_hours(section)
            }
            ViewMode::Agenda => self.draw_agenda(section),
        }
    }

    fn notify(&mut self, notification: &ReminderNotification) -> anyhow::Result<()> {
        let bell = self.paint("Reminder:", "1;33");
        let body = notification.body();
        let mut lines = body.lines();
        writeln!(self.out, "{bell} {}", lines.next().unwrap_or_default())?;
        for line in lines {
            writeln!(self.out, "  {line}")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

fn task_label(task: &Task) -> String {
    match &task.icon {
        Some(icon) => format!("{icon} {}", task.title),
        None => task.title.clone(),
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| format!("{header:width$}"))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{}", header_line.trim_end())?;

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
                format!("{cell}{}", " ".repeat(width.saturating_sub(visible_width)))
            })
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    use super::*;
    use crate::index::TaskIndex;
    use crate::task::TaskDraft;
    use crate::view::{ViewController, present};

    fn instant(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").expect("valid instant")
    }

    fn sample_tasks() -> TaskIndex {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date");
        let time = NaiveTime::from_hms_opt(9, 0, 0).expect("valid time");
        let mut draft = TaskDraft::new("Dentist", date, time);
        draft.icon = Some("🦷".to_string());
        TaskIndex::new(vec![Task::from_draft(
            1,
            draft,
            instant("2024-03-01T08:00:00"),
        )])
    }

    fn render(view: ViewMode, now: &str) -> String {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date");
        let controller = ViewController::new(view, date);
        let instruction = controller.build(&sample_tasks(), &Settings::default(), instant(now));
        let mut renderer = Renderer::plain(Vec::new());
        assert_eq!(present(&instruction, &mut renderer), 0);
        String::from_utf8(renderer.into_inner()).expect("utf8 output")
    }

    #[test]
    fn month_view_marks_today_and_busy_days() {
        let output = render(ViewMode::Month, "2024-03-15T07:00:00");
        assert!(output.starts_with("March 2024\n"));
        assert!(output.contains(" Sun  Mon"));
        assert!(output.contains("[15]*"));
        assert!(output.contains("Mar 15 09:00  🦷 Dentist"));
    }

    #[test]
    fn day_view_lists_only_busy_hours() {
        let output = render(ViewMode::Day, "2024-03-01T07:00:00");
        assert!(output.contains("Friday, March 15, 2024"));
        assert!(output.contains("  09:00  🦷 Dentist (1h)"));
        assert_eq!(output.matches("Dentist").count(), 1);
    }

    #[test]
    fn agenda_renders_aligned_table() {
        let output = render(ViewMode::Agenda, "2024-03-01T07:00:00");
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines.iter().any(|line| line.starts_with("ID Date")));
        assert!(lines.iter().any(|line| line.contains("2024-03-15 09:00 🦷 Dentist reminder")));

        let empty = render(ViewMode::Agenda, "2024-04-01T07:00:00");
        assert!(empty.contains("No upcoming tasks."));
    }

    #[test]
    fn strip_ansi_measures_visible_text() {
        assert_eq!(strip_ansi("\x1b[33m12\x1b[0m"), "12");
    }
}

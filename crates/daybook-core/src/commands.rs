use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, anyhow};
use chrono::NaiveDateTime;
use tracing::{debug, info, instrument, warn};

use crate::app::{Calendar, MoveConflict, MoveOutcome};
use crate::cli::{AddArgs, Command, EditArgs, MoveArgs, ViewArgs};
use crate::config::Config;
use crate::datastore::StorageAdapter;
use crate::datetime::{format_date, format_instant, format_time, local_now};
use crate::reminder::Reminder;
use crate::render::Renderer;
use crate::settings::SettingUpdate;
use crate::task::{TaskDraft, TaskId};
use crate::view::Direction;

#[instrument(skip(calendar, cfg, renderer, command, now))]
pub fn dispatch<S, W>(
    calendar: &mut Calendar<S>,
    cfg: &Config,
    renderer: &mut Renderer<W>,
    command: Option<Command>,
    now: NaiveDateTime,
) -> anyhow::Result<()>
where
    S: StorageAdapter,
    W: Write,
{
    let command = command.unwrap_or_else(|| Command::View(ViewArgs::default()));
    debug!(?command, "dispatching command");

    match command {
        Command::View(args) => cmd_view(calendar, cfg, renderer, args, now),
        Command::Add(args) => cmd_add(calendar, renderer, args, now),
        Command::Edit(args) => cmd_edit(calendar, renderer, args, now),
        Command::Show { id } => cmd_show(calendar, renderer, id),
        Command::Delete { id } => cmd_delete(calendar, renderer, id),
        Command::Move(args) => cmd_move(calendar, renderer, args),
        Command::Reminders => renderer.print_reminders(calendar.reminders().reminders(), now),
        Command::Dismiss { reminder_id } => {
            calendar.remove_reminder(&reminder_id)?;
            renderer.message(&format!("Dismissed {reminder_id}."))
        }
        Command::Settings { updates } => cmd_settings(calendar, renderer, updates),
        Command::Poll => cmd_poll(calendar, renderer, now),
        Command::Watch => cmd_watch(calendar, cfg, renderer),
    }
}

#[instrument(skip(calendar, cfg, renderer, args, now))]
fn cmd_view<S: StorageAdapter, W: Write>(
    calendar: &mut Calendar<S>,
    cfg: &Config,
    renderer: &mut Renderer<W>,
    args: ViewArgs,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let mode = match args.mode {
        Some(mode) => mode,
        None => cfg.default_view(),
    };
    info!(view = %mode, offset = args.offset, "command view");

    calendar.switch_view(mode);
    calendar.go_to(args.date.unwrap_or_else(|| now.date()));
    let direction = if args.offset < 0 {
        Direction::Previous
    } else {
        Direction::Next
    };
    for _ in 0..args.offset.unsigned_abs() {
        calendar.navigate(direction);
    }

    let failed = calendar.render(renderer, now);
    if failed > 0 {
        warn!(failed, "view rendered with skipped steps");
    }
    Ok(())
}

#[instrument(skip(calendar, renderer, args, now))]
fn cmd_add<S: StorageAdapter, W: Write>(
    calendar: &mut Calendar<S>,
    renderer: &mut Renderer<W>,
    args: AddArgs,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command add");

    let mut draft = TaskDraft::new(args.title, args.date, args.time);
    if let Some(duration) = args.duration {
        draft.duration = duration;
    }
    draft.description = args.description;
    draft.icon = args.icon;
    draft.reminder_enabled = !args.no_reminder;
    draft.do_not_disturb = args.dnd;

    let id = calendar.add_task(draft, now)?;
    renderer.message(&format!("Created task {id}."))?;
    report_reminder(calendar, renderer, id)
}

#[instrument(skip(calendar, renderer, args, now))]
fn cmd_edit<S: StorageAdapter, W: Write>(
    calendar: &mut Calendar<S>,
    renderer: &mut Renderer<W>,
    args: EditArgs,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!(id = args.id, "command edit");

    let task = calendar
        .task(args.id)
        .ok_or_else(|| anyhow!("task not found: {}", args.id))?;
    let mut draft = TaskDraft::from_task(task);
    if let Some(title) = args.title {
        draft.title = title;
    }
    if let Some(date) = args.date {
        draft.date = date;
    }
    if let Some(time) = args.time {
        draft.time = time;
    }
    if let Some(duration) = args.duration {
        draft.duration = duration;
    }
    if let Some(description) = args.description {
        draft.description = Some(description);
    }
    if let Some(icon) = args.icon {
        draft.icon = Some(icon);
    }
    if let Some(reminder) = args.reminder {
        draft.reminder_enabled = reminder;
    }
    if let Some(dnd) = args.dnd {
        draft.do_not_disturb = dnd;
    }

    calendar.update_task(args.id, draft, now)?;
    renderer.message(&format!("Modified task {}.", args.id))?;
    report_reminder(calendar, renderer, args.id)
}

fn cmd_show<S: StorageAdapter, W: Write>(
    calendar: &Calendar<S>,
    renderer: &mut Renderer<W>,
    id: TaskId,
) -> anyhow::Result<()> {
    let task = calendar
        .task(id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;
    renderer.print_task_info(task)
}

#[instrument(skip(calendar, renderer))]
fn cmd_delete<S: StorageAdapter, W: Write>(
    calendar: &mut Calendar<S>,
    renderer: &mut Renderer<W>,
    id: TaskId,
) -> anyhow::Result<()> {
    info!("command delete");
    let task = calendar.delete_task(id)?;
    renderer.message(&format!("Deleted task {id} '{}'.", task.title))
}

#[instrument(skip(calendar, renderer, args))]
fn cmd_move<S: StorageAdapter, W: Write>(
    calendar: &mut Calendar<S>,
    renderer: &mut Renderer<W>,
    args: MoveArgs,
) -> anyhow::Result<()> {
    info!(id = args.id, "command move");

    let assume_yes = args.yes;
    let outcome = calendar.move_task(args.id, args.date, args.time, |conflict| {
        assume_yes || confirm_on_terminal(conflict)
    })?;

    match outcome {
        MoveOutcome::Moved => {
            let task = calendar
                .task(args.id)
                .ok_or_else(|| anyhow!("task not found: {}", args.id))?;
            renderer.message(&format!(
                "Moved task {} to {} {}.",
                args.id,
                format_date(task.date),
                format_time(task.time)
            ))
        }
        MoveOutcome::Declined => renderer.message("Move cancelled; nothing changed."),
    }
}

/// Asks on the terminal whether to share an occupied slot. Declines when
/// stdin is not interactive.
fn confirm_on_terminal(conflict: &MoveConflict) -> bool {
    if !io::stdin().is_terminal() {
        warn!("slot occupied and stdin is not a terminal; pass --yes to move anyway");
        return false;
    }

    let titles = conflict
        .existing
        .iter()
        .map(|task| task.title.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    eprint!(
        "{} {} already has: {titles}. Move '{}' there anyway? [y/N] ",
        format_date(conflict.date),
        format_time(conflict.time),
        conflict.task.title
    );
    let _ = io::stderr().flush();

    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(error) => {
            warn!(%error, "failed reading confirmation");
            false
        }
    }
}

fn cmd_settings<S: StorageAdapter, W: Write>(
    calendar: &mut Calendar<S>,
    renderer: &mut Renderer<W>,
    updates: Vec<SettingUpdate>,
) -> anyhow::Result<()> {
    for update in updates {
        info!(%update, "command settings");
        calendar.update_setting(update);
    }
    renderer.print_settings(calendar.settings())
}

#[instrument(skip(calendar, renderer, now))]
fn cmd_poll<S: StorageAdapter, W: Write>(
    calendar: &mut Calendar<S>,
    renderer: &mut Renderer<W>,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let report = calendar.poll_and_notify(renderer, now);
    if report.is_empty() {
        return renderer.message("No reminders due.");
    }
    let suppressed = report.suppressed();
    if suppressed > 0 {
        renderer.message(&format!("{suppressed} reminder(s) fired silently (do not disturb)."))?;
    }
    Ok(())
}

fn cmd_watch<S: StorageAdapter, W: Write>(
    calendar: &mut Calendar<S>,
    cfg: &Config,
    renderer: &mut Renderer<W>,
) -> anyhow::Result<()> {
    let interval = cfg.poll_interval();
    info!(interval_secs = interval.as_secs(), "watching reminders");
    renderer
        .message(&format!(
            "Watching reminders every {}s; press Ctrl-C to stop.",
            interval.as_secs()
        ))
        .context("failed writing watch banner")?;

    loop {
        calendar.reload_records();
        let report = calendar.poll_and_notify(renderer, local_now());
        if !report.is_empty() {
            debug!(fired = report.fired.len(), suppressed = report.suppressed(), "poll tick");
        }
        std::thread::sleep(interval);
    }
}

fn report_reminder<S: StorageAdapter, W: Write>(
    calendar: &Calendar<S>,
    renderer: &mut Renderer<W>,
    id: TaskId,
) -> anyhow::Result<()> {
    if let Some(reminder) = calendar.reminders().get(&Reminder::id_for_task(id)) {
        renderer.message(&format!(
            "Reminder at {}.",
            format_instant(reminder.reminder_time)
        ))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::cli::GlobalCli;
    use crate::datastore::MemoryStore;
    use clap::Parser;

    fn instant(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").expect("valid instant")
    }

    fn run(
        calendar: &mut Calendar<MemoryStore>,
        words: &[&str],
        now: &str,
    ) -> anyhow::Result<String> {
        let cli = GlobalCli::try_parse_from(words).expect("parse args");
        let mut renderer = Renderer::plain(Vec::new());
        dispatch(calendar, &Config::default(), &mut renderer, cli.command, instant(now))?;
        Ok(String::from_utf8(renderer.into_inner()).expect("utf8"))
    }

    fn calendar() -> Calendar<MemoryStore> {
        Calendar::load(MemoryStore::new(), instant("2024-03-01T08:00:00").date())
    }

    #[test]
    fn add_then_show_and_poll() {
        let mut cal = calendar();
        let out = run(
            &mut cal,
            &["daybook", "add", "Dentist", "--date", "2024-03-15", "--time", "09:00"],
            "2024-03-01T08:00:00",
        )
        .expect("add");
        assert!(out.contains("Reminder at 2024-03-14 09:00."));
        let id = cal.tasks().iter().next().map(|t| t.id).expect("task stored");

        let shown = run(&mut cal, &["daybook", "show", &id.to_string()], "2024-03-01T08:00:00")
            .expect("show");
        assert!(shown.contains("title     Dentist"));

        let polled = run(&mut cal, &["daybook", "poll"], "2024-03-14T09:00:01").expect("poll");
        assert!(polled.contains("Reminder: Dentist\n  Due 2024-03-15 09:00\n"));
        let again = run(&mut cal, &["daybook", "poll"], "2024-03-14T09:00:02").expect("poll");
        assert_eq!(again.trim(), "No reminders due.");
    }

    #[test]
    fn move_with_yes_shares_slot() {
        let mut cal = calendar();
        let now = "2024-03-01T08:00:00";
        run(&mut cal, &["daybook", "add", "A", "--date", "2024-03-15", "--time", "09:00"], now)
            .expect("add");
        run(&mut cal, &["daybook", "add", "B", "--date", "2024-03-16", "--time", "09:00"], now)
            .expect("add");
        let b = cal
            .tasks()
            .iter()
            .find(|t| t.title == "B")
            .map(|t| t.id)
            .expect("task B");

        let out = run(
            &mut cal,
            &["daybook", "move", &b.to_string(), "--date", "2024-03-15", "--yes"],
            now,
        )
        .expect("move");
        assert!(out.contains("to 2024-03-15 09:00"));
        let target = chrono::NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date");
        assert_eq!(cal.tasks().tasks_on_date(target).len(), 2);
    }

    #[test]
    fn unknown_ids_are_errors() {
        let mut cal = calendar();
        assert!(run(&mut cal, &["daybook", "delete", "42"], "2024-03-01T08:00:00").is_err());
        assert!(run(&mut cal, &["daybook", "dismiss", "reminder_42"], "2024-03-01T08:00:00").is_err());
    }

    #[test]
    fn settings_update_and_list() {
        let mut cal = calendar();
        let out = run(
            &mut cal,
            &["daybook", "settings", "startOnMonday=on", "reminderLeadHours=2"],
            "2024-03-01T08:00:00",
        )
        .expect("settings");
        assert!(out.contains("startOnMonday"));
        assert!(cal.settings().start_on_monday);
        assert_eq!(cal.reminders().lead_hours(), 2);
    }

    #[test]
    fn default_command_renders_month() {
        let mut cal = calendar();
        let out = run(&mut cal, &["daybook"], "2024-03-01T08:00:00").expect("view");
        assert!(out.starts_with("March 2024"));
    }
}

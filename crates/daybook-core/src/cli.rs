use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveTime};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::datetime::{parse_date, parse_time};
use crate::settings::SettingUpdate;
use crate::task::TaskId;
use crate::view::ViewMode;

/// Periods `view --offset` may move in either direction (a century of months).
pub const MAX_VIEW_OFFSET: i64 = 1200;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "daybook",
    version,
    about = "Daybook: a terminal calendar with tasks and reminders",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "daybookrc")]
    pub daybookrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the calendar in one of the six views.
    View(ViewArgs),

    /// Create a task.
    Add(AddArgs),

    /// Change fields of an existing task.
    Edit(EditArgs),

    /// Print every field of one task.
    Show { id: TaskId },

    /// Delete a task and its reminders.
    Delete { id: TaskId },

    /// Move a task to another day (and optionally time).
    Move(MoveArgs),

    /// List stored reminders.
    Reminders,

    /// Remove one reminder.
    Dismiss { reminder_id: String },

    /// Show settings, or change them with KEY=VALUE pairs.
    Settings {
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<SettingUpdate>()))]
        updates: Vec<SettingUpdate>,
    },

    /// Fire due reminders once.
    Poll,

    /// Keep polling reminders until interrupted.
    Watch,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<ViewMode>()))]
    pub mode: Option<ViewMode>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(parse_date))]
    pub date: Option<NaiveDate>,

    /// Navigate this many periods forward (negative goes back).
    #[arg(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i32).range(-MAX_VIEW_OFFSET..=MAX_VIEW_OFFSET)
    )]
    pub offset: i32,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    pub title: String,

    #[arg(long, value_parser = clap::builder::ValueParser::new(parse_date))]
    pub date: NaiveDate,

    #[arg(long, value_parser = clap::builder::ValueParser::new(parse_time))]
    pub time: NaiveTime,

    /// Hours.
    #[arg(long)]
    pub duration: Option<f64>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub icon: Option<String>,

    #[arg(long = "no-reminder")]
    pub no_reminder: bool,

    /// Fire this task's reminder silently.
    #[arg(long)]
    pub dnd: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: TaskId,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(parse_date))]
    pub date: Option<NaiveDate>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(parse_time))]
    pub time: Option<NaiveTime>,

    #[arg(long)]
    pub duration: Option<f64>,

    /// Empty string clears it.
    #[arg(long)]
    pub description: Option<String>,

    /// Empty string clears it.
    #[arg(long)]
    pub icon: Option<String>,

    #[arg(long)]
    pub reminder: Option<bool>,

    #[arg(long)]
    pub dnd: Option<bool>,
}

#[derive(Args, Debug, Clone)]
pub struct MoveArgs {
    pub id: TaskId,

    #[arg(long, value_parser = clap::builder::ValueParser::new(parse_date))]
    pub date: NaiveDate,

    #[arg(long, value_parser = clap::builder::ValueParser::new(parse_time))]
    pub time: Option<NaiveTime>,

    /// Move even when the slot is taken, without asking.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls `rc.KEY=VALUE` / `rc.KEY:VALUE` words out of the argument list so
/// they can sit anywhere on the command line.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                if k.trim().is_empty() {
                    return Err(anyhow!("empty rc override key in '{s}'"));
                }
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k.to_string(), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<OsString> {
        words.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["daybook", "rc.color=off", "view", "rc.default.view:week"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["daybook", "view"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("color".to_string(), "off".to_string()),
                ("default.view".to_string(), "week".to_string()),
            ]
        );
        assert!(preprocess_args(&args(&["daybook", "rc.=x"])).is_err());
    }

    #[test]
    fn parses_add_command() {
        let cli = GlobalCli::try_parse_from([
            "daybook",
            "-vv",
            "add",
            "Dentist",
            "--date",
            "2024-03-15",
            "--time",
            "09:00",
            "--dnd",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Command::Add(add)) => {
                assert_eq!(add.title, "Dentist");
                assert_eq!(add.date, NaiveDate::from_ymd_opt(2024, 3, 15).expect("date"));
                assert_eq!(add.time, NaiveTime::from_hms_opt(9, 0, 0).expect("time"));
                assert!(add.dnd);
                assert!(!add.no_reminder);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_view_and_settings() {
        let cli = GlobalCli::try_parse_from(["daybook", "view", "work-week", "--offset", "-1"])
            .expect("parse");
        match cli.command {
            Some(Command::View(view)) => {
                assert_eq!(view.mode, Some(ViewMode::WorkWeek));
                assert_eq!(view.offset, -1);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = GlobalCli::try_parse_from(["daybook", "settings", "showWeekends=off"])
            .expect("parse");
        match cli.command {
            Some(Command::Settings { updates }) => {
                assert_eq!(updates, vec![SettingUpdate::ShowWeekends(false)]);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(GlobalCli::try_parse_from(["daybook", "view", "fortnight"]).is_err());
        assert!(
            GlobalCli::try_parse_from(["daybook", "view", "--offset", "9223372036854775807"])
                .is_err()
        );
        assert!(GlobalCli::try_parse_from(["daybook", "view", "--offset", "-1201"]).is_err());
        assert!(GlobalCli::try_parse_from(["daybook", "view", "--offset", "1200"]).is_ok());
        assert!(
            GlobalCli::try_parse_from(["daybook", "add", "X", "--date", "15/03/2024", "--time", "9"])
                .is_err()
        );
    }
}

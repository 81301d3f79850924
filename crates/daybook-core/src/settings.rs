use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::parse_bool_strict;
use crate::reminder::{DEFAULT_LEAD_HOURS, MAX_LEAD_HOURS};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub global_do_not_disturb: bool,
    pub show_weekends: bool,
    pub start_on_monday: bool,
    pub reminder_lead_hours: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            global_do_not_disturb: false,
            show_weekends: true,
            start_on_monday: false,
            reminder_lead_hours: DEFAULT_LEAD_HOURS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingUpdate {
    GlobalDoNotDisturb(bool),
    ShowWeekends(bool),
    StartOnMonday(bool),
    ReminderLeadHours(u32),
}

impl Settings {
    /// Applies one update; returns whether anything changed.
    pub fn apply(&mut self, update: SettingUpdate) -> bool {
        let before = *self;
        match update {
            SettingUpdate::GlobalDoNotDisturb(value) => self.global_do_not_disturb = value,
            SettingUpdate::ShowWeekends(value) => self.show_weekends = value,
            SettingUpdate::StartOnMonday(value) => self.start_on_monday = value,
            SettingUpdate::ReminderLeadHours(hours) => {
                self.reminder_lead_hours = clamp_lead_hours(hours)
            }
        }
        before != *self
    }

    /// Pulls values read from storage back into range.
    pub fn sanitized(mut self) -> Self {
        let hours = clamp_lead_hours(self.reminder_lead_hours);
        if hours != self.reminder_lead_hours {
            warn!(
                stored = self.reminder_lead_hours,
                using = hours,
                "stored reminder lead time out of range"
            );
            self.reminder_lead_hours = hours;
        }
        self
    }

    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("globalDoNotDisturb", on_off(self.global_do_not_disturb)),
            ("showWeekends", on_off(self.show_weekends)),
            ("startOnMonday", on_off(self.start_on_monday)),
            ("reminderLeadHours", self.reminder_lead_hours.to_string()),
        ]
    }
}

fn clamp_lead_hours(hours: u32) -> u32 {
    hours.clamp(1, MAX_LEAD_HOURS)
}

fn on_off(value: bool) -> String {
    let text = if value { "on" } else { "off" };
    text.to_string()
}

impl FromStr for SettingUpdate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected SETTING=VALUE, got: {s}"))?;
        let key = key.trim();
        let value = value.trim();

        let flag = || {
            parse_bool_strict(value)
                .ok_or_else(|| anyhow!("invalid boolean for {key}: {value}"))
        };

        match key.to_ascii_lowercase().replace(['-', '_', '.'], "").as_str() {
            "globaldonotdisturb" | "donotdisturb" | "dnd" => {
                Ok(SettingUpdate::GlobalDoNotDisturb(flag()?))
            }
            "showweekends" => Ok(SettingUpdate::ShowWeekends(flag()?)),
            "startonmonday" => Ok(SettingUpdate::StartOnMonday(flag()?)),
            "reminderleadhours" | "leadhours" => {
                let hours: u32 = value
                    .parse()
                    .map_err(|_| anyhow!("invalid hour count for {key}: {value}"))?;
                if !(1..=MAX_LEAD_HOURS).contains(&hours) {
                    bail!("{key} must be between 1 and {MAX_LEAD_HOURS} hours");
                }
                Ok(SettingUpdate::ReminderLeadHours(hours))
            }
            _ => Err(anyhow!("unknown setting: {key}")),
        }
    }
}

impl fmt::Display for SettingUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingUpdate::GlobalDoNotDisturb(value) => {
                write!(f, "globalDoNotDisturb={}", on_off(*value))
            }
            SettingUpdate::ShowWeekends(value) => write!(f, "showWeekends={}", on_off(*value)),
            SettingUpdate::StartOnMonday(value) => write!(f, "startOnMonday={}", on_off(*value)),
            SettingUpdate::ReminderLeadHours(hours) => write!(f, "reminderLeadHours={hours}"),
        }
    }
}

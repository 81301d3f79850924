use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Local,
  NaiveDate,
  NaiveDateTime,
  NaiveTime
};

pub const DATE_FORMAT: &str =
  "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
pub const INSTANT_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S";

const TIME_FORMATS: [&str; 2] =
  ["%H:%M", "%H:%M:%S"];

const NAIVE_INSTANT_FORMATS: [&str;
  5] = [
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M"
];

/// Current wall-clock time on this
/// device. All scheduling happens in
/// naive local time.
#[must_use]
pub fn local_now() -> NaiveDateTime {
  Local::now().naive_local()
}

#[must_use]
pub fn local_today() -> NaiveDate {
  Local::now().date_naive()
}

pub fn parse_date(
  raw: &str
) -> anyhow::Result<NaiveDate> {
  let trimmed = raw.trim();
  NaiveDate::parse_from_str(
    trimmed,
    DATE_FORMAT
  )
  .with_context(|| {
    format!(
      "invalid date '{trimmed}' \
       (expected YYYY-MM-DD)"
    )
  })
}

pub fn parse_time(
  raw: &str
) -> anyhow::Result<NaiveTime> {
  let trimmed = raw.trim();
  TIME_FORMATS
    .iter()
    .find_map(|format| {
      NaiveTime::parse_from_str(
        trimmed, format
      )
      .ok()
    })
    .ok_or_else(|| {
      anyhow!(
        "invalid time '{trimmed}' \
         (expected HH:MM)"
      )
    })
}

/// Parses a stored instant. Naive
/// forms are taken as local time;
/// RFC 3339 values carrying an offset
/// (records written as UTC `...Z`)
/// are converted into local time.
pub fn parse_instant(
  raw: &str
) -> anyhow::Result<NaiveDateTime> {
  let trimmed = raw.trim();
  if let Some(naive) =
    NAIVE_INSTANT_FORMATS
      .iter()
      .find_map(|format| {
        NaiveDateTime::parse_from_str(
          trimmed, format
        )
        .ok()
      })
  {
    return Ok(naive);
  }

  DateTime::parse_from_rfc3339(trimmed)
    .map(|dt| {
      dt.with_timezone(&Local)
        .naive_local()
    })
    .with_context(|| {
      format!(
        "invalid timestamp '{trimmed}'"
      )
    })
}

#[must_use]
pub fn format_date(
  date: NaiveDate
) -> String {
  date.format(DATE_FORMAT).to_string()
}

#[must_use]
pub fn format_time(
  time: NaiveTime
) -> String {
  time.format(TIME_FORMAT).to_string()
}

#[must_use]
pub fn format_instant(
  instant: NaiveDateTime
) -> String {
  instant
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

pub mod date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_date(*date)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_date(&raw)
      .map_err(serde::de::Error::custom)
  }
}

pub mod time_serde {
  use chrono::NaiveTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    time: &NaiveTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_time(*time)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_time(&raw)
      .map_err(serde::de::Error::custom)
  }
}

pub mod instant_serde {
  use chrono::NaiveDateTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    instant: &NaiveDateTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &instant
        .format(super::INSTANT_FORMAT)
        .to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDateTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_instant(&raw)
      .map_err(serde::de::Error::custom)
  }
}

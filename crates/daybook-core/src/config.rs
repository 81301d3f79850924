use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::reminder::POLL_INTERVAL;
use crate::view::ViewMode;

const RC_ENV_VAR: &str = "DAYBOOKRC";
const RC_FILE_NAME: &str = ".daybookrc";
const DEFAULT_DATA_DIR: &str =
  ".daybook";

pub const KEY_DATA_LOCATION: &str =
  "data.location";
pub const KEY_COLOR: &str = "color";
pub const KEY_DEFAULT_VIEW: &str =
  "default.view";
pub const KEY_POLL_SECONDS: &str =
  "reminder.poll.seconds";

const KNOWN_KEYS: [&str; 4] = [
  KEY_DATA_LOCATION,
  KEY_COLOR,
  KEY_DEFAULT_VIEW,
  KEY_POLL_SECONDS
];

/// One meaningful line of a
/// daybookrc.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting {
    key:   &'a str,
    value: &'a str
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let map = [
      (
        KEY_DATA_LOCATION,
        format!("~/{DEFAULT_DATA_DIR}")
      ),
      (KEY_COLOR, "on".to_string()),
      (
        KEY_DEFAULT_VIEW,
        ViewMode::Month
          .as_key()
          .to_string()
      ),
      (
        KEY_POLL_SECONDS,
        POLL_INTERVAL
          .as_secs()
          .to_string()
      )
    ]
    .into_iter()
    .map(|(key, value)| {
      (key.to_string(), value)
    })
    .collect();

    Config {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override)
    {
      | Some(path) => {
        info!(rc = %path.display(), "loading daybookrc");
        cfg.load_file(&path)?;
      }
      | None => {
        debug!(
          "no daybookrc; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Command-line overrides; the
  /// `rc.` prefix is optional.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (raw_key, value) in overrides {
      let key = normalize_key(&raw_key);
      debug!(key = %key, value = %value, "applying override");
      self.set(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  fn get_u64(
    &self,
    key: &str
  ) -> Option<u64> {
    let raw = self.map.get(key)?;
    match raw.trim().parse::<u64>() {
      | Ok(value) => Some(value),
      | Err(error) => {
        warn!(key, value = %raw, %error, "ignoring non-numeric config value");
        None
      }
    }
  }

  /// `color`; an unparseable value is
  /// an error rather than a guess.
  pub fn color_enabled(
    &self
  ) -> anyhow::Result<bool> {
    let Some(raw) = self.get(KEY_COLOR)
    else {
      return Ok(true);
    };
    parse_bool_strict(&raw).ok_or_else(
      || {
        anyhow!(
          "invalid color setting: {raw}"
        )
      }
    )
  }

  /// `default.view`, falling back to
  /// month.
  pub fn default_view(
    &self
  ) -> ViewMode {
    let Some(raw) =
      self.get(KEY_DEFAULT_VIEW)
    else {
      return ViewMode::Month;
    };
    match raw.parse() {
      | Ok(view) => view,
      | Err(error) => {
        warn!(value = %raw, %error, "ignoring default.view");
        ViewMode::Month
      }
    }
  }

  /// Reminder polling cadence; never
  /// below one second.
  pub fn poll_interval(
    &self
  ) -> Duration {
    self
      .get_u64(KEY_POLL_SECONDS)
      .map(|secs| {
        Duration::from_secs(secs.max(1))
      })
      .unwrap_or(POLL_INTERVAL)
  }

  fn set(
    &mut self,
    key: String,
    value: String
  ) {
    if !KNOWN_KEYS
      .contains(&key.as_str())
    {
      warn!(key = %key, "unknown config key; keeping it anyway");
    }
    self.map.insert(key, value);
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let parsed = parse_rc_line(
        raw_line
      )
      .with_context(|| {
        format!(
          "{}:{}",
          path.display(),
          idx + 1
        )
      })?;

      match parsed {
        | None => {}
        | Some(RcLine::Include(
          include
        )) => {
          self.load_include(
            &base_dir, include
          )?;
        }
        | Some(RcLine::Setting {
          key,
          value
        }) => {
          trace!(key, value, "loaded config key");
          self.set(
            normalize_key(key),
            value.to_string()
          );
        }
      }
    }

    Ok(())
  }

  fn load_include(
    &mut self,
    base_dir: &Path,
    include: &str
  ) -> anyhow::Result<()> {
    let target = expand_tilde(
      Path::new(include)
    );
    let target = if target.is_absolute()
    {
      target
    } else {
      base_dir.join(target)
    };

    if self
      .loaded_files
      .contains(&target)
    {
      warn!(include = %target.display(), "include already loaded; skipping");
      return Ok(());
    }
    if !target.exists() {
      warn!(include = %target.display(), "include file does not exist; skipping");
      return Ok(());
    }
    self.load_file(&target)
  }
}

/// `None` for blank and comment-only
/// lines.
fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>>
{
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(rest) =
    line.strip_prefix("include ")
  {
    let include = rest.trim();
    if include.is_empty() {
      bail!(
        "include path cannot be empty"
      );
    }
    return Ok(Some(RcLine::Include(
      include
    )));
  }

  let Some((key, value)) =
    line.split_once('=')
  else {
    bail!(
      "invalid config line: {raw}"
    );
  };
  let key = key.trim();
  if key.is_empty() {
    bail!(
      "missing key in config line: \
       {raw}"
    );
  }
  Ok(Some(RcLine::Setting {
    key,
    value: value.trim()
  }))
}

fn normalize_key(raw: &str) -> String {
  let key = raw.trim();
  key
    .strip_prefix("rc.")
    .unwrap_or(key)
    .to_ascii_lowercase()
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => {
      match cfg.get(KEY_DATA_LOCATION) {
        | Some(location) => {
          expand_tilde(Path::new(
            &location
          ))
        }
        | None => home_dir()?
          .join(DEFAULT_DATA_DIR)
      }
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (rc_env != "/dev/null")
      .then(|| PathBuf::from(rc_env));
  }

  let candidate =
    dirs::home_dir()?.join(RC_FILE_NAME);
  candidate
    .exists()
    .then_some(candidate)
}

fn home_dir() -> anyhow::Result<PathBuf>
{
  dirs::home_dir().ok_or_else(|| {
    anyhow!(
      "cannot determine home \
       directory"
    )
  })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  match (
    path.strip_prefix("~"),
    dirs::home_dir()
  ) {
    | (Ok(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => path.to_path_buf()
  }
}

pub(crate) fn parse_bool_strict(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

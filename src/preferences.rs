use crate::filter::FilterMode;
use anyhow::{Context, Result};
use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const FILENAME: &str = "pi-sessions.toml";

/// User-facing preferences stored in `<data-dir>/pi-sessions.toml`.
///
/// ```toml
/// default_filter = "no-tools"
/// badge_expiry_hours = 24
/// badge_file = "badge-states.json"
/// utc_offset_minutes = 120
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Tree filter used when a request names none.
    /// Options: "default", "no-tools", "user-only", "labeled-only", "all"
    #[serde(default = "default_filter")]
    pub default_filter: String,

    /// How long a new/updated badge stays visible.
    #[serde(default = "default_badge_expiry_hours")]
    pub badge_expiry_hours: u32,

    /// Badge state file, relative to the data directory.
    #[serde(default = "default_badge_file")]
    pub badge_file: String,

    /// Local time offset used for calendar days, hours and weekdays.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_filter() -> String {
    FilterMode::Default.as_str().into()
}

fn default_badge_expiry_hours() -> u32 {
    24
}

fn default_badge_file() -> String {
    "badge-states.json".into()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_filter: default_filter(),
            badge_expiry_hours: default_badge_expiry_hours(),
            badge_file: default_badge_file(),
            utc_offset_minutes: 0,
        }
    }
}

impl Preferences {
    /// Load preferences from `dir/pi-sessions.toml`.
    ///
    /// If the file doesn't exist it is created with defaults. Missing keys
    /// in an existing file are filled in with defaults via serde.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let prefs: Preferences = toml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let prefs = Preferences::default();
                let toml_str = toml::to_string_pretty(&prefs)
                    .context("serializing default preferences")?;
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
                fs::write(&path, &toml_str)
                    .with_context(|| format!("writing default {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn filter_mode(&self) -> FilterMode {
        FilterMode::parse(&self.default_filter)
    }

    pub fn badge_ttl(&self) -> Duration {
        Duration::hours(i64::from(self.badge_expiry_hours))
    }

    pub fn badge_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.badge_file)
    }

    /// The configured offset, or UTC when it is out of range.
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                warn!(minutes = self.utc_offset_minutes, "utc offset out of range, using UTC");
                Utc.fix()
            })
    }
}

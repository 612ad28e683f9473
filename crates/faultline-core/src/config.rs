use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::render::Dialect;

/// Directory holding the config file and, by default, the database.
pub const FAULTLINE_DIR: &str = ".faultline";
pub const CONFIG_FILE: &str = "config.toml";
/// Overrides config discovery when set.
pub const CONFIG_ENV: &str = "FAULTLINE_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default = "default_priorities")]
    pub priorities: Vec<PriorityConfig>,
    #[serde(default = "default_statuses")]
    pub statuses: Vec<StatusConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            projects: Vec::new(),
            users: Vec::new(),
            groups: Vec::new(),
            priorities: default_priorities(),
            statuses: default_statuses(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Key every notice must carry in its routing parameters. Ingestion is
    /// disabled while unset.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub text_formatting: Dialect,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Relative paths resolve against the directory containing `.faultline/`.
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            text_formatting: Dialect::default(),
            store_timeout_ms: default_store_timeout_ms(),
            database: default_database(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub identifier: String,
    #[serde(default = "default_trackers")]
    pub trackers: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Extra noise patterns matched against backtrace file paths.
    #[serde(default)]
    pub backtrace_filter: Vec<String>,
    #[serde(default)]
    pub repository_root: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub name: String,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default)]
    pub is_default: bool,
}

impl Config {
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.server.store_timeout_ms)
    }

    /// Database location for a config found under `root`.
    #[must_use]
    pub fn database_path(&self, root: &Path) -> PathBuf {
        if self.server.database.is_absolute() {
            self.server.database.clone()
        } else {
            root.join(&self.server.database)
        }
    }

    /// Reject configurations the directories cannot serve consistently.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate project identifiers, a project without
    /// trackers, or status and priority lists without exactly one usable
    /// default.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for project in &self.projects {
            if project.identifier.trim().is_empty() {
                bail!("project identifier must not be empty");
            }
            if !seen.insert(project.identifier.as_str()) {
                bail!("duplicate project identifier '{}'", project.identifier);
            }
            if project.trackers.is_empty() {
                bail!("project '{}' has no trackers", project.identifier);
            }
        }

        if self.priorities.is_empty() {
            bail!("at least one priority must be configured");
        }
        if self.priorities.iter().filter(|p| p.is_default).count() > 1 {
            bail!("more than one priority is marked is_default");
        }

        let open_defaults = self
            .statuses
            .iter()
            .filter(|s| s.is_default && !s.is_closed)
            .count();
        if open_defaults != 1 {
            bail!("exactly one open status must be marked is_default, found {open_defaults}");
        }
        Ok(())
    }
}

/// Load the config at `path`; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<Config>(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Walk up from `start` to the nearest directory containing `.faultline/`.
#[must_use]
pub fn find_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(FAULTLINE_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// Resolve the config file: explicit path, then `FAULTLINE_CONFIG`, then the
/// nearest `.faultline/config.toml` above `cwd`, then the user-level
/// `faultline/config.toml`, then `cwd` itself.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(root) = find_root(cwd) {
        return root.join(FAULTLINE_DIR).join(CONFIG_FILE);
    }
    if let Some(path) = user_config_path().filter(|p| p.exists()) {
        return path;
    }
    cwd.join(FAULTLINE_DIR).join(CONFIG_FILE)
}

/// `<config dir>/faultline/config.toml`, when the platform has one.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("faultline").join(CONFIG_FILE))
}

/// Directory relative database paths resolve against: the parent of the
/// `.faultline/` directory holding `config_path`, else its own directory.
#[must_use]
pub fn config_root(config_path: &Path) -> PathBuf {
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    if dir.file_name().is_some_and(|name| name == FAULTLINE_DIR) {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}

pub const STARTER_CONFIG: &str = r#"# faultline configuration

[server]
# Notices must carry this key in their routing parameters.
api_key = "change-me"
# textile or markdown
text_formatting = "textile"
store_timeout_ms = 5000
database = ".faultline/faultline.db"

[[projects]]
identifier = "example"
trackers = ["Bug"]
categories = []
# Noise patterns matched against backtrace file paths, e.g. "GEM_ROOT".
backtrace_filter = []
# repository_root = "/trunk"

# [[users]]
# login = "alice"

# [[groups]]
# name = "developers"
"#;

/// Create `.faultline/config.toml` under `root`.
///
/// # Errors
///
/// Returns an error if the config already exists or cannot be written.
pub fn write_starter_config(root: &Path) -> Result<PathBuf> {
    let dir = root.join(FAULTLINE_DIR);
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    std::fs::write(&path, STARTER_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

const fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_database() -> PathBuf {
    PathBuf::from(FAULTLINE_DIR).join("faultline.db")
}

fn default_trackers() -> Vec<String> {
    vec!["Bug".to_string()]
}

fn default_priorities() -> Vec<PriorityConfig> {
    [("Low", false), ("Normal", true), ("High", false), ("Urgent", false), ("Immediate", false)]
        .into_iter()
        .zip(1..)
        .map(|((name, is_default), id)| PriorityConfig {
            id,
            name: name.to_string(),
            is_default,
        })
        .collect()
}

fn default_statuses() -> Vec<StatusConfig> {
    [
        ("New", false, true),
        ("In Progress", false, false),
        ("Resolved", false, false),
        ("Feedback", false, false),
        ("Closed", true, false),
        ("Rejected", true, false),
    ]
    .into_iter()
    .map(|(name, is_closed, is_default)| StatusConfig {
        name: name.to_string(),
        is_closed,
        is_default,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_temp_dir(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "faultline-config-test-{label}-{}-{id}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("temp dir must be created");
        dir
    }

    #[test]
    fn missing_config_uses_defaults() {
        let root = make_temp_dir("defaults");
        let cfg = load_config(&root.join("nope.toml")).expect("load should succeed");
        assert!(cfg.server.api_key.is_none());
        assert_eq!(cfg.server.text_formatting, Dialect::Textile);
        assert_eq!(cfg.store_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.priorities.len(), 5);
        assert!(cfg.statuses.iter().any(|s| s.is_closed));
        cfg.validate().expect("defaults are valid");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn starter_config_parses_and_validates() {
        let root = make_temp_dir("starter");
        let path = write_starter_config(&root).expect("write starter");
        let cfg = load_config(&path).expect("parse starter");
        assert_eq!(cfg.server.api_key.as_deref(), Some("change-me"));
        assert_eq!(cfg.projects[0].identifier, "example");
        assert_eq!(cfg.projects[0].trackers, vec!["Bug".to_string()]);
        cfg.validate().expect("starter is valid");

        assert!(write_starter_config(&root).is_err(), "second init must fail");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn parses_full_config() {
        let cfg: Config = toml::from_str(
            r#"
[server]
api_key = "secret"
text_formatting = "markdown"
store_timeout_ms = 250

[[projects]]
identifier = "shop"
trackers = ["Bug", "Exception"]
categories = ["Backend"]
backtrace_filter = ["GEM_ROOT", "vendor/"]
repository_root = "/trunk/"

[[users]]
login = "alice"

[[groups]]
name = "developers"

[[statuses]]
name = "Open"
is_default = true

[[statuses]]
name = "Done"
is_closed = true
"#,
        )
        .expect("parse");

        assert_eq!(cfg.server.text_formatting, Dialect::Markdown);
        assert_eq!(cfg.store_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.projects[0].backtrace_filter.len(), 2);
        assert_eq!(cfg.users[0].login, "alice");
        assert_eq!(cfg.groups[0].name, "developers");
        assert_eq!(cfg.statuses.len(), 2);
        assert_eq!(cfg.priorities.len(), 5, "priorities fall back to defaults");
        cfg.validate().expect("valid");
    }

    #[test]
    fn validate_rejects_duplicate_projects() {
        let cfg: Config = toml::from_str(
            "[[projects]]\nidentifier = \"a\"\n\n[[projects]]\nidentifier = \"a\"\n",
        )
        .expect("parse");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_default_open_status() {
        let cfg: Config =
            toml::from_str("[[statuses]]\nname = \"Closed\"\nis_closed = true\nis_default = true\n")
                .expect("parse");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn discovery_walks_up_to_faultline_dir() {
        let root = make_temp_dir("discover");
        std::fs::create_dir_all(root.join(FAULTLINE_DIR)).expect("mkdir");
        let nested = root.join("a/b");
        std::fs::create_dir_all(&nested).expect("mkdir nested");

        assert_eq!(find_root(&nested), Some(root.clone()));
        let explicit = root.join("other.toml");
        assert_eq!(resolve_config_path(Some(&explicit), &nested), explicit);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn database_path_resolves_against_root() {
        let cfg = Config::default();
        let config_path = Path::new("/srv/app/.faultline/config.toml");
        let root = config_root(config_path);
        assert_eq!(root, PathBuf::from("/srv/app"));
        assert_eq!(
            cfg.database_path(&root),
            PathBuf::from("/srv/app/.faultline/faultline.db")
        );
    }
}

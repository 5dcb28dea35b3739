//! ESM credentials configuration.
//!
//! Credentials live in an INI file with one section per appliance profile:
//!
//! ```ini
//! [esm]
//! esmhost = 10.0.0.5
//! esmuser = NGCP
//! esmpass = secret
//! ```
//!
//! Without an explicit path the file is looked up as `.mfe_saw.ini`,
//! `.mfesaw.ini` or `.mfesaw2.ini` in the directories named by `HOME`,
//! `APPDATA` and `XDG_HOME`, then in the current directory. Files with the
//! same stems and a `.toml` extension are read as TOML tables. `ESM_HOST`,
//! `ESM_USER` and `ESM_PASS` override whatever the files provide.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use ini::Ini;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// Default profile (table) name in the credentials file
pub const DEFAULT_SECTION: &str = "esm";

/// Environment variables naming directories to search
const HOME_VARS: &[&str] = &["HOME", "APPDATA", "XDG_HOME"];

/// Credentials file names, in read order
const CONFIG_FILE_NAMES: &[&str] = &[
    ".mfe_saw.ini",
    ".mfesaw.ini",
    ".mfesaw2.ini",
    ".mfe_saw.toml",
    ".mfesaw.toml",
    ".mfesaw2.toml",
];

/// Keys read from a profile section
const KEY_HOST: &str = "esmhost";
const KEY_USER: &str = "esmuser";
const KEY_PASS: &str = "esmpass";

const ENV_HOST: &str = "ESM_HOST";
const ENV_USER: &str = "ESM_USER";
const ENV_PASS: &str = "ESM_PASS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No credentials file found (looked for {})", CONFIG_FILE_NAMES.join(", "))]
    NotFound,

    #[error("Config file does not exist: {0}")]
    MissingFile(PathBuf),

    #[error("Section not found in config file: {0}")]
    MissingSection(String),

    #[error("Invalid config: missing {0}")]
    MissingField(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseIni {
        path: PathBuf,
        source: ini::ParseError,
    },
}

/// ESM host and login. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    host: String,
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_parts(Some(host.into()), Some(username.into()), Some(password.into()))
    }

    /// Build credentials from possibly-missing parts. Empty strings count
    /// as missing.
    pub fn from_parts(
        host: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ConfigError> {
        fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingField(field))
        }

        Ok(Self {
            host: required(host, KEY_HOST)?,
            username: required(username, KEY_USER)?,
            password: required(password, KEY_PASS)?,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One profile table as it appears in a credentials file.
#[derive(Debug, Clone, Default, Deserialize)]
struct Section {
    esmhost: Option<String>,
    esmuser: Option<String>,
    esmpass: Option<String>,
}

impl Section {
    /// Overlay `other` onto `self`, field by field.
    fn merge(&mut self, other: Section) {
        if other.esmhost.is_some() {
            self.esmhost = other.esmhost;
        }
        if other.esmuser.is_some() {
            self.esmuser = other.esmuser;
        }
        if other.esmpass.is_some() {
            self.esmpass = other.esmpass;
        }
    }

    fn is_empty(&self) -> bool {
        self.esmhost.is_none() && self.esmuser.is_none() && self.esmpass.is_none()
    }
}

type ConfigFile = HashMap<String, Section>;

/// Resolves credentials from files and the environment.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    section: String,
    search_dirs: Vec<PathBuf>,
    env: HashMap<String, String>,
}

impl ConfigLoader {
    /// Loader for `section`, searching the standard locations and reading
    /// overrides from the process environment.
    pub fn new(section: impl Into<String>) -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();

        let mut search_dirs: Vec<PathBuf> = HOME_VARS
            .iter()
            .filter_map(|var| env.get(*var))
            .map(PathBuf::from)
            .collect();
        if search_dirs.is_empty() {
            if let Some(home) = dirs::home_dir() {
                search_dirs.push(home);
            }
        }
        search_dirs.push(PathBuf::from("."));

        Self {
            section: section.into(),
            search_dirs,
            env,
        }
    }

    /// Replace the directories searched when no explicit path is given.
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    /// Replace the environment used for overrides.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Resolve credentials. An explicit `path` must exist; otherwise every
    /// credentials file found in the search directories is read, later files
    /// overriding earlier ones.
    pub fn load(&self, path: Option<&Path>) -> Result<Credentials, ConfigError> {
        let files = match path {
            Some(path) if path.is_file() => vec![path.to_path_buf()],
            Some(path) => return Err(ConfigError::MissingFile(path.to_path_buf())),
            None => self.discover(),
        };

        let overrides = self.env_section();
        if files.is_empty() && overrides.is_empty() {
            return Err(ConfigError::NotFound);
        }

        let mut section = Section::default();
        let mut found_section = false;
        for file in &files {
            info!(path = %file.display(), "Reading credentials file");
            let mut parsed = Self::read_file(file)?;
            if let Some(s) = parsed.remove(&self.section) {
                section.merge(s);
                found_section = true;
            }
        }

        if !files.is_empty() && !found_section && overrides.is_empty() {
            return Err(ConfigError::MissingSection(self.section.clone()));
        }

        if !overrides.is_empty() {
            debug!("Applying environment overrides");
            section.merge(overrides);
        }

        Credentials::from_parts(section.esmhost, section.esmuser, section.esmpass)
    }

    fn discover(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in &self.search_dirs {
            for name in CONFIG_FILE_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    debug!(path = %candidate.display(), "Found credentials file");
                    found.push(candidate);
                }
            }
        }
        found
    }

    fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
        if is_toml {
            return toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            });
        }

        let parsed = Ini::load_from_str(&contents).map_err(|source| ConfigError::ParseIni {
            path: path.to_path_buf(),
            source,
        })?;
        let sections = parsed
            .iter()
            .filter_map(|(name, props)| {
                let get = |key: &str| props.get(key).map(str::to_string);
                name.map(|name| {
                    let section = Section {
                        esmhost: get(KEY_HOST),
                        esmuser: get(KEY_USER),
                        esmpass: get(KEY_PASS),
                    };
                    (name.to_string(), section)
                })
            })
            .collect();
        Ok(sections)
    }

    fn env_section(&self) -> Section {
        let get = |key: &str| self.env.get(key).filter(|v| !v.is_empty()).cloned();
        Section {
            esmhost: get(ENV_HOST),
            esmuser: get(ENV_USER),
            esmpass: get(ENV_PASS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn loader(dirs: Vec<PathBuf>) -> ConfigLoader {
        ConfigLoader::new(DEFAULT_SECTION)
            .with_search_dirs(dirs)
            .with_env(HashMap::new())
    }

    #[test]
    fn test_credentials_require_every_field() {
        let err = Credentials::from_parts(None, Some("u".into()), Some("p".into())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("esmhost")));

        let err = Credentials::from_parts(Some("h".into()), None, Some("p".into())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("esmuser")));

        let err = Credentials::from_parts(Some("h".into()), Some("u".into()), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("esmpass")));

        let err = Credentials::new("h", "u", "  ").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("esmpass")));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("esm.local", "admin", "hunter2").unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("esm.local"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "creds.toml",
            "[esm]\nesmhost = \"10.0.0.5\"\nesmuser = \"NGCP\"\nesmpass = \"secret\"\n",
        );

        let creds = loader(vec![]).load(Some(&path)).unwrap();
        assert_eq!(creds.host(), "10.0.0.5");
        assert_eq!(creds.username(), "NGCP");
        assert_eq!(creds.password(), "secret");
    }

    #[test]
    fn test_load_explicit_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = loader(vec![]).load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile(_)));
    }

    #[test]
    fn test_load_nothing_found() {
        let dir = TempDir::new().unwrap();
        let err = loader(vec![dir.path().to_path_buf()]).load(None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound));
    }

    #[test]
    fn test_load_missing_section() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".mfesaw2.toml", "[other]\nesmhost = \"h\"\n");
        let err = loader(vec![dir.path().to_path_buf()]).load(None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection(s) if s == "esm"));
    }

    #[test]
    fn test_load_missing_field() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".mfesaw2.toml", "[esm]\nesmhost = \"h\"\nesmuser = \"u\"\n");
        let err = loader(vec![dir.path().to_path_buf()]).load(None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("esmpass")));
    }

    #[test]
    fn test_later_files_override_earlier() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            ".mfe_saw.toml",
            "[esm]\nesmhost = \"old\"\nesmuser = \"u\"\nesmpass = \"p\"\n",
        );
        write(&dir, ".mfesaw2.toml", "[esm]\nesmhost = \"new\"\n");

        let creds = loader(vec![dir.path().to_path_buf()]).load(None).unwrap();
        assert_eq!(creds.host(), "new");
        assert_eq!(creds.username(), "u");
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            ".mfesaw.toml",
            "[esm]\nesmhost = \"h\"\nesmuser = \"u\"\nesmpass = \"p\"\n",
        );
        let env = HashMap::from([(ENV_PASS.to_string(), "from-env".to_string())]);

        let creds = loader(vec![dir.path().to_path_buf()])
            .with_env(env)
            .load(None)
            .unwrap();
        assert_eq!(creds.password(), "from-env");
        assert_eq!(creds.host(), "h");
    }

    #[test]
    fn test_env_only() {
        let dir = TempDir::new().unwrap();
        let env = HashMap::from([
            (ENV_HOST.to_string(), "h".to_string()),
            (ENV_USER.to_string(), "u".to_string()),
            (ENV_PASS.to_string(), "p".to_string()),
        ]);

        let creds = loader(vec![dir.path().to_path_buf()])
            .with_env(env)
            .load(None)
            .unwrap();
        assert_eq!(creds, Credentials::new("h", "u", "p").unwrap());
    }

    #[test]
    fn test_custom_section() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "creds.toml",
            "[lab]\nesmhost = \"lab\"\nesmuser = \"u\"\nesmpass = \"p\"\n",
        );

        let creds = ConfigLoader::new("lab")
            .with_env(HashMap::new())
            .load(Some(&path))
            .unwrap();
        assert_eq!(creds.host(), "lab");
    }

    #[test]
    fn test_load_ini_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            ".mfesaw2.ini",
            "[esm]\nesmhost = 10.0.0.5\nesmuser = NGCP\nesmpass = secret\n\n[lab]\nesmhost = lab\n",
        );

        let creds = loader(vec![dir.path().to_path_buf()]).load(None).unwrap();
        assert_eq!(creds.host(), "10.0.0.5");
        assert_eq!(creds.username(), "NGCP");
        assert_eq!(creds.password(), "secret");
    }

    #[test]
    fn test_toml_file_overrides_ini_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            ".mfe_saw.ini",
            "[esm]\nesmhost = old\nesmuser = u\nesmpass = p\n",
        );
        write(&dir, ".mfesaw.toml", "[esm]\nesmhost = \"new\"\n");

        let creds = loader(vec![dir.path().to_path_buf()]).load(None).unwrap();
        assert_eq!(creds.host(), "new");
        assert_eq!(creds.password(), "p");
    }

    #[test]
    fn test_ini_missing_section() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "creds.ini", "[other]\nesmhost = h\n");
        let err = loader(vec![]).load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection(s) if s == "esm"));
    }

    #[test]
    fn test_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "creds.toml", "[esm\nesmhost = ");
        let err = loader(vec![]).load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}

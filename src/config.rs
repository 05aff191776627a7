//! Layered settings: built-in defaults, then an optional YAML/JSON file, then
//! environment variables, then command-line flags.

use std::{
    env,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, ensure};
use encoding_rs::Encoding;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    cli::{GlobalArgs, parse_delimiter},
    dialect::Dialect,
    inference::DEFAULT_MAX_VARCHAR_LENGTH,
    io_utils,
};

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_DATABASE: &str = "csv_converter";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub csv: CsvSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    #[serde(rename = "type")]
    pub kind: Dialect,
    pub host: String,
    pub port: u16,
    #[serde(alias = "user")]
    pub username: String,
    pub password: String,
    #[serde(rename = "database")]
    pub name: Option<String>,
    pub data_dir: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            kind: Dialect::Sqlite,
            host: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            name: Some(DEFAULT_DATABASE.to_string()),
            data_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvSettings {
    pub encoding: String,
    pub delimiter: Option<String>,
    pub chunk_size: usize,
    pub max_varchar_length: usize,
    /// Rows inspected for type inference; 0 scans the whole file.
    pub sample_rows: usize,
}

impl Default for CsvSettings {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
            delimiter: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_varchar_length: DEFAULT_MAX_VARCHAR_LENGTH,
            sample_rows: 0,
        }
    }
}

impl CsvSettings {
    pub fn encoding(&self) -> Result<&'static Encoding> {
        Ok(io_utils::resolve_encoding(Some(&self.encoding))?)
    }

    pub fn delimiter(&self) -> Result<Option<u8>> {
        self.delimiter
            .as_deref()
            .map(|value| parse_delimiter(value).map_err(|err| anyhow!("Invalid delimiter: {err}")))
            .transpose()
    }
}

impl Settings {
    /// Reads a settings file. `.json` files are parsed as JSON, everything
    /// else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let settings = if is_json {
            serde_json::from_reader(reader)
                .with_context(|| format!("Parsing config JSON {path:?}"))?
        } else {
            serde_yaml::from_reader(reader)
                .with_context(|| format!("Parsing config YAML {path:?}"))?
        };
        debug!("Loaded settings from {path:?}");
        Ok(settings)
    }

    /// Defaults, config file, environment and flags, in increasing priority.
    pub fn resolve(global: &GlobalArgs) -> Result<Self> {
        let mut settings = match &global.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply_env_with(|key| env::var(key).ok())?;
        settings.apply_args(global);
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("DB_TYPE") {
            self.database.kind = Dialect::from_str(&kind).map_err(|err| anyhow!("DB_TYPE: {err}"))?;
        }
        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            self.database.port = parse_env("DB_PORT", &port)?;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.username = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(name) = lookup("DB_NAME") {
            self.database.name = Some(name).filter(|name| !name.trim().is_empty());
        }
        if let Some(dir) = lookup("DB_DATA_DIR") {
            self.database.data_dir = PathBuf::from(dir);
        }
        if let Some(encoding) = lookup("CSV_ENCODING") {
            self.csv.encoding = encoding;
        }
        if let Some(chunk_size) = lookup("CSV_CHUNK_SIZE") {
            self.csv.chunk_size = parse_env("CSV_CHUNK_SIZE", &chunk_size)?;
        }
        if let Some(length) = lookup("CSV_MAX_VARCHAR_LENGTH") {
            self.csv.max_varchar_length = parse_env("CSV_MAX_VARCHAR_LENGTH", &length)?;
        }
        Ok(())
    }

    pub fn apply_args(&mut self, global: &GlobalArgs) {
        if let Some(kind) = global.db_kind {
            self.database.kind = kind;
        }
        if let Some(host) = &global.host {
            self.database.host = host.clone();
        }
        if let Some(port) = global.port {
            self.database.port = port;
        }
        if let Some(user) = &global.user {
            self.database.username = user.clone();
        }
        if let Some(password) = &global.password {
            self.database.password = password.clone();
        }
        if let Some(name) = &global.database {
            self.database.name = Some(name.clone());
        }
        if let Some(dir) = &global.data_dir {
            self.database.data_dir = dir.clone();
        }
        if let Some(delimiter) = global.delimiter {
            self.csv.delimiter = Some(char::from(delimiter).to_string());
        }
        if let Some(encoding) = &global.input_encoding {
            self.csv.encoding = encoding.clone();
        }
        if let Some(length) = global.max_varchar_length {
            self.csv.max_varchar_length = length;
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.csv.chunk_size > 0, "chunk_size must be greater than zero");
        ensure!(
            self.csv.max_varchar_length > 0,
            "max_varchar_length must be greater than zero"
        );
        self.csv.encoding()?;
        self.csv.delimiter()?;
        Ok(())
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Environment variable {key} has invalid value '{raw}'"))
}

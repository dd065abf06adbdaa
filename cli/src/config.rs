use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_NUTRITION_BASE_URL: &str = "https://api.calorieninjas.com";
pub const DEFAULT_RECIPE_BASE_URL: &str = "https://api.api-ninjas.com";

const NUTRITION_KEY_VAR: &str = "NUTRILOG_NUTRITION_API_KEY";
const RECIPE_KEY_VAR: &str = "NUTRILOG_RECIPE_API_KEY";
const NUTRITION_URL_VAR: &str = "NUTRILOG_NUTRITION_BASE_URL";
const RECIPE_URL_VAR: &str = "NUTRILOG_RECIPE_BASE_URL";

/// Optional `<data_dir>/config.json`. Environment variables win over it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    nutrition_api_key: Option<String>,
    recipe_api_key: Option<String>,
    nutrition_base_url: Option<String>,
    recipe_base_url: Option<String>,
}

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub nutrition_base_url: String,
    pub recipe_base_url: String,
    nutrition_api_key: Option<String>,
    recipe_api_key: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "nutrilog").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Self::from_sources(&data_dir, |name| std::env::var(name).ok())
    }

    pub(crate) fn from_sources(data_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = read_config_file(&data_dir.join("config.json"))?;
        let pick = |var: &str, from_file: Option<String>| {
            env(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or(from_file)
        };

        Ok(Config {
            db_path: data_dir.join("nutrilog.db"),
            data_dir: data_dir.to_path_buf(),
            nutrition_base_url: pick(NUTRITION_URL_VAR, file.nutrition_base_url)
                .unwrap_or_else(|| DEFAULT_NUTRITION_BASE_URL.to_string()),
            recipe_base_url: pick(RECIPE_URL_VAR, file.recipe_base_url)
                .unwrap_or_else(|| DEFAULT_RECIPE_BASE_URL.to_string()),
            nutrition_api_key: pick(NUTRITION_KEY_VAR, file.nutrition_api_key),
            recipe_api_key: pick(RECIPE_KEY_VAR, file.recipe_api_key),
        })
    }

    pub fn nutrition_api_key(&self) -> Result<&str> {
        self.nutrition_api_key.as_deref().with_context(|| {
            format!(
                "No nutrition API key. Set {NUTRITION_KEY_VAR} or add \"nutrition_api_key\" to {}",
                self.data_dir.join("config.json").display()
            )
        })
    }

    pub fn recipe_api_key(&self) -> Result<&str> {
        self.recipe_api_key.as_deref().with_context(|| {
            format!(
                "No recipe API key. Set {RECIPE_KEY_VAR} or add \"recipe_api_key\" to {}",
                self.data_dir.join("config.json").display()
            )
        })
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

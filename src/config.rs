use crate::aggregate::DEFAULT_DAILY_CAP;
use crate::author::AuthorStore;
use crate::error::{Result, TimekeepError};
use crate::estimate::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::export::timecamp::DEFAULT_TIMECAMP_URL;
use crate::model::ProjectConfig;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    Gemini,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// One time entry per project with the project total.
    Project,
    /// One time entry per task.
    Task,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub daily_cap: f64,
    pub estimator: EstimatorKind,
    pub gemini_model: String,
    pub gemini_url: String,
    /// humantime duration, e.g. `60s` or `2m`.
    pub request_timeout: String,
    /// Multiplier applied to estimator hours before rounding.
    pub hours_scale: f64,
    pub export_mode: ExportMode,
    pub timecamp_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daily_cap: DEFAULT_DAILY_CAP,
            estimator: EstimatorKind::Gemini,
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: "60s".to_string(),
            hours_scale: 0.25,
            export_mode: ExportMode::Project,
            timecamp_url: DEFAULT_TIMECAMP_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.request_timeout).map_err(|e| {
            TimekeepError::Config(format!("invalid request_timeout '{}': {e}", self.request_timeout))
        })
    }

    fn validate(&self) -> Result<()> {
        if !self.daily_cap.is_finite() || self.daily_cap <= 0.0 {
            return Err(TimekeepError::Config(format!(
                "daily_cap must be positive, got {}",
                self.daily_cap
            )));
        }
        if !self.hours_scale.is_finite() || self.hours_scale <= 0.0 {
            return Err(TimekeepError::Config(format!(
                "hours_scale must be positive, got {}",
                self.hours_scale
            )));
        }
        self.request_timeout()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

/// Accepts both the object form and a bare list of projects.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigShape {
    Full(ConfigFile),
    Projects(Vec<ProjectConfig>),
}

/// Project configuration backed by a JSON file; author emails confirmed during
/// a run are written back to it.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    file: ConfigFile,
}

impl ConfigStore {
    /// Default location: `<config dir>/timekeep/projects.json`.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("timekeep").join("projects.json"))
            .ok_or_else(|| TimekeepError::Config("could not determine config directory".to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TimekeepError::Config(format!(
                "project configuration not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let file = match serde_json::from_str::<ConfigShape>(&content) {
            Ok(ConfigShape::Full(file)) => file,
            Ok(ConfigShape::Projects(projects)) => ConfigFile {
                settings: Settings::default(),
                projects,
            },
            Err(e) => {
                return Err(TimekeepError::Config(format!(
                    "invalid configuration {}: {e}",
                    path.display()
                )))
            }
        };
        file.settings.validate()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.file.settings
    }

    pub fn projects(&self) -> &[ProjectConfig] {
        &self.file.projects
    }

    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.file.projects.iter().find(|p| p.name == name)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.file)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl AuthorStore for ConfigStore {
    fn author_email(&self, project: &str) -> Option<String> {
        self.project(project).and_then(|p| p.author_email.clone())
    }

    fn save_author_email(&mut self, project: &str, email: &str) -> Result<()> {
        let entry = self
            .file
            .projects
            .iter_mut()
            .find(|p| p.name == project)
            .ok_or_else(|| TimekeepError::Config(format!("unknown project '{project}'")))?;
        if entry.author_email.as_deref() == Some(email) {
            return Ok(());
        }
        entry.author_email = Some(email.to_string());
        self.save()
    }
}

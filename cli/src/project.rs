use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Project file looked up in the working directory when `--project` is not given.
pub const DEFAULT_PROJECT_FILE: &str = "studygen.toml";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error in '{}': {message}", path.display())]
    Toml { path: PathBuf, message: String },

    #[error("no {what} given: pass {flag} or set `{key}` in studygen.toml")]
    Missing {
        what: &'static str,
        flag: &'static str,
        key: &'static str,
    },
}

/// Defaults read from `studygen.toml`. Relative paths are relative to the
/// project file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    pub configuration: Option<PathBuf>,
    pub master: Option<PathBuf>,
    #[serde(default)]
    pub catalog: Vec<PathBuf>,
    pub template: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub extension: Option<String>,
}

impl ProjectFile {
    /// Load an explicitly named project file, or `studygen.toml` if it
    /// exists. No project file at all yields empty defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ProjectError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(DEFAULT_PROJECT_FILE);
                if path.is_file() {
                    Self::load(path)
                } else {
                    Ok(ProjectFile::default())
                }
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let text = fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let project: ProjectFile = toml::from_str(&text).map_err(|e| ProjectError::Toml {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let base = path.parent().unwrap_or(Path::new(""));
        Ok(project.relative_to(base))
    }

    fn relative_to(self, base: &Path) -> Self {
        let join = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        ProjectFile {
            configuration: self.configuration.map(join),
            master: self.master.map(join),
            catalog: self.catalog.into_iter().map(join).collect(),
            template: self.template.map(join),
            output: self.output.map(join),
            extension: self.extension,
        }
    }
}

/// Every input of a run, command line first, then the project file.
#[derive(Debug)]
pub struct Inputs {
    pub configuration: PathBuf,
    pub master: PathBuf,
    pub catalogs: Vec<PathBuf>,
    pub template: Option<PathBuf>,
    pub output: PathBuf,
    pub extension: String,
}

/// Values given on the command line.
#[derive(Debug, Default)]
pub struct Overrides {
    pub configuration: Option<PathBuf>,
    pub master: Option<PathBuf>,
    pub catalogs: Vec<PathBuf>,
    pub template: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub extension: Option<String>,
}

impl Inputs {
    pub fn resolve(overrides: Overrides, project: ProjectFile) -> Result<Self, ProjectError> {
        let configuration = overrides
            .configuration
            .or(project.configuration)
            .ok_or(ProjectError::Missing {
                what: "configuration",
                flag: "--config",
                key: "configuration",
            })?;
        let master = overrides.master.or(project.master).ok_or(ProjectError::Missing {
            what: "master specification",
            flag: "--master",
            key: "master",
        })?;
        let catalogs = if overrides.catalogs.is_empty() {
            project.catalog
        } else {
            overrides.catalogs
        };
        if catalogs.is_empty() {
            return Err(ProjectError::Missing {
                what: "block catalog",
                flag: "--catalog",
                key: "catalog",
            });
        }

        Ok(Inputs {
            configuration,
            master,
            catalogs,
            template: overrides.template.or(project.template),
            output: overrides
                .output
                .or(project.output)
                .unwrap_or_else(|| PathBuf::from(".")),
            extension: overrides
                .extension
                .or(project.extension)
                .unwrap_or_else(|| "py".to_string()),
        })
    }
}

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rayon::prelude::*;
use studygen::{Catalog, ParamValue, Template};
use tracing::{debug, error, info};

use crate::documents::{Configuration, MasterSpec};
use crate::error::{EngineError, EngineResult};
use crate::registry::{PreparedTarget, materialize_parameters, resolve_target};
use crate::render::{DEFAULT_TEMPLATE, render_artifact};
use crate::scan::{Combination, expand, scan_axes};

/// Where and how artifacts are produced.
#[derive(Debug, Clone)]
pub struct StudyOptions {
    pub output_root: PathBuf,
    /// File extension of every artifact, without the dot.
    pub extension: String,
    /// When false, artifacts are rendered but nothing touches the disk.
    pub write: bool,
}

impl Default for StudyOptions {
    fn default() -> Self {
        StudyOptions {
            output_root: PathBuf::from("."),
            extension: "py".to_string(),
            write: true,
        }
    }
}

/// A directory of the output tree with the scan values that lead to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Branch {
    /// Directory relative to the output root.
    pub directory: PathBuf,
    /// Every sampled value on the way down, outermost first.
    pub values: Vec<(String, ParamValue)>,
    /// Values substituted for `main` parameters, twins expanded. Deeper
    /// scans of the same parameter win.
    pub overrides: IndexMap<String, ParamValue>,
}

impl Branch {
    /// The branch for `combination` inside `directory`.
    fn nest(&self, directory: PathBuf, combination: &Combination) -> Branch {
        let subpath = combination.subpath();
        let directory = if subpath.is_empty() {
            directory
        } else {
            directory.join(subpath)
        };
        let mut values = self.values.clone();
        values.extend(combination.values.iter().cloned());
        let mut overrides = self.overrides.clone();
        for (name, value) in &combination.overrides {
            overrides.insert(name.clone(), value.clone());
        }
        Branch {
            directory,
            values,
            overrides,
        }
    }

    /// `name=value` pairs of the sampled values, for diagnostics.
    pub fn describe_values(&self) -> String {
        if self.values.is_empty() {
            return "no scanned values".to_string();
        }
        self.values
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One artifact to produce: a target rendered in one branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub target: String,
    pub branch: Branch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedArtifact {
    pub target: String,
    pub path: PathBuf,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub job: Job,
    pub error: EngineError,
}

/// Outcome of a whole study, in plan order.
#[derive(Debug, Clone, Default)]
pub struct StudyReport {
    pub artifacts: Vec<GeneratedArtifact>,
    pub failures: Vec<JobFailure>,
}

impl StudyReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Expand the layers and scans of a master document into jobs.
///
/// Without `structure`, every target is generated at the root. Otherwise
/// each layer is a directory nested under every combination of the
/// previous layer, and scan values accumulate down the tree.
pub fn plan(master: &MasterSpec) -> EngineResult<Vec<Job>> {
    let mut jobs = Vec::new();

    if master.structure.is_empty() {
        let root = Branch::default();
        for target in master.targets.keys() {
            target_jobs(master, target, &root, &mut jobs)?;
        }
        check_distinct_paths(&jobs)?;
        return Ok(jobs);
    }

    let mut branches = vec![Branch::default()];
    for (layer, spec) in &master.structure {
        let combinations = expand(&scan_axes(&spec.scans)?);
        let mut next = Vec::with_capacity(branches.len() * combinations.len());
        for branch in &branches {
            for combination in &combinations {
                let nested = branch.nest(branch.directory.join(layer), combination);
                for target in &spec.generations {
                    target_jobs(master, target, &nested, &mut jobs)?;
                }
                next.push(nested);
            }
        }
        branches = next;
    }
    check_distinct_paths(&jobs)?;
    Ok(jobs)
}

/// Jobs run in parallel, so no two may write the same artifact.
fn check_distinct_paths(jobs: &[Job]) -> EngineResult<()> {
    let mut seen = HashSet::with_capacity(jobs.len());
    for job in jobs {
        let path = job.branch.directory.join(&job.target);
        if !seen.insert(path.clone()) {
            return Err(EngineError::DuplicateOutput {
                target: job.target.clone(),
                path,
            });
        }
    }
    Ok(())
}

/// Jobs of one target in `branch`, one per combination of its own scans.
fn target_jobs(
    master: &MasterSpec,
    target: &str,
    branch: &Branch,
    jobs: &mut Vec<Job>,
) -> EngineResult<()> {
    let spec = master
        .targets
        .get(target)
        .ok_or_else(|| EngineError::UnknownTarget(target.to_string()))?;
    for combination in expand(&scan_axes(&spec.scans)?) {
        jobs.push(Job {
            target: target.to_string(),
            branch: branch.nest(branch.directory.clone(), &combination),
        });
    }
    Ok(())
}

/// A study: the catalog, both documents, and how to write the results.
pub struct Study<'a> {
    catalog: &'a Catalog,
    master: &'a MasterSpec,
    configuration: &'a Configuration,
    template: Template,
    options: StudyOptions,
}

impl<'a> Study<'a> {
    pub fn new(
        catalog: &'a Catalog,
        master: &'a MasterSpec,
        configuration: &'a Configuration,
    ) -> EngineResult<Self> {
        Ok(Study {
            catalog,
            master,
            configuration,
            template: Template::parse(DEFAULT_TEMPLATE)?,
            options: StudyOptions::default(),
        })
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = template;
        self
    }

    pub fn with_options(mut self, options: StudyOptions) -> Self {
        self.options = options;
        self
    }

    /// Generate every job. One job failing never stops the others; the
    /// report lists artifacts and failures in plan order.
    pub fn run(&self) -> EngineResult<StudyReport> {
        let jobs = plan(self.master)?;
        debug!(jobs = jobs.len(), "planned study");

        let mut names: Vec<&str> = Vec::new();
        for job in &jobs {
            if !names.contains(&job.target.as_str()) {
                names.push(&job.target);
            }
        }

        let prepared: IndexMap<String, EngineResult<PreparedTarget>> = names
            .par_iter()
            .map(|name| (name.to_string(), self.prepare(name)))
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        let results: Vec<EngineResult<GeneratedArtifact>> = jobs
            .par_iter()
            .map(|job| self.generate(job, &prepared))
            .collect();

        // Report sequentially for deterministic output
        let mut report = StudyReport::default();
        for (job, result) in jobs.into_iter().zip(results) {
            match result {
                Ok(artifact) => {
                    info!(path = %artifact.path.display(), written = self.options.write, "generated");
                    report.artifacts.push(artifact);
                }
                Err(err) => {
                    error!(
                        generation = %job.target,
                        directory = %job.branch.directory.display(),
                        values = %job.branch.describe_values(),
                        error = %err,
                        "generation failed"
                    );
                    report.failures.push(JobFailure { job, error: err });
                }
            }
        }
        Ok(report)
    }

    fn prepare(&self, name: &str) -> EngineResult<PreparedTarget> {
        let spec = self
            .master
            .targets
            .get(name)
            .ok_or_else(|| EngineError::UnknownTarget(name.to_string()))?;
        resolve_target(self.catalog, name, spec)
    }

    fn generate(
        &self,
        job: &Job,
        prepared: &IndexMap<String, EngineResult<PreparedTarget>>,
    ) -> EngineResult<GeneratedArtifact> {
        let target = match prepared.get(&job.target) {
            Some(Ok(target)) => target,
            Some(Err(err)) => return Err(err.clone()),
            None => return Err(EngineError::UnknownTarget(job.target.clone())),
        };

        let values = materialize_parameters(&target.main, self.configuration, &job.branch.overrides)?;
        let text = render_artifact(&self.template, target, &values)?;
        let path = self
            .options
            .output_root
            .join(&job.branch.directory)
            .join(format!("{}.{}", job.target, self.options.extension));

        if self.options.write {
            write_artifact(&path, &text)?;
        }

        Ok(GeneratedArtifact {
            target: job.target.clone(),
            path,
            text,
        })
    }
}

fn write_artifact(path: &Path, text: &str) -> EngineResult<()> {
    let io_error = |err: std::io::Error| EngineError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, text).map_err(io_error)
}

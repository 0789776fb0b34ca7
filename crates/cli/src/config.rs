//! Loads a TOML job configuration file (`spec.md` §3: "Job is created by
//! the external config loader") and turns one named `[jobs.<name>]` table
//! into a fully validated [`dsp_core::Job`].
//!
//! Validation happens eagerly, before any journal is opened or directory is
//! touched, so every failure here is a [`ConfigError`] mapped to
//! [`ExitCode::ConfigOrArgument`](dsp_core::ExitCode::ConfigOrArgument)
//! rather than a mid-run fatal error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use dsp_core::{ConfigError, Job, Mode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    jobs: BTreeMap<String, RawJob>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    source_root: PathBuf,
    dest_root: PathBuf,
    mode: String,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default = "default_safety_net_days")]
    safety_net_days: u32,
    #[serde(default)]
    verify: bool,
    #[serde(default = "default_retries")]
    retries: u32,
    #[serde(default = "default_threads")]
    threads: usize,
}

const fn default_safety_net_days() -> u32 {
    30
}

const fn default_retries() -> u32 {
    3
}

const fn default_threads() -> usize {
    4
}

/// Overrides carried on the command line rather than in the config file;
/// these never have a meaningful "value in the file" to fall back to.
#[derive(Clone, Copy, Debug, Default)]
pub struct JobOverrides {
    pub dry_run: bool,
    pub resume: bool,
    pub verify: bool,
}

/// Reads `path`, validates it, and builds the named job.
///
/// Exclude patterns are compiled (and discarded) here purely to fail fast on
/// a syntax error before the run starts, rather than surfacing a
/// `PatternError` after the scan has already begun.
pub fn load_job(path: &Path, job_name: &str, overrides: JobOverrides) -> Result<Job, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    let raw_job = raw
        .jobs
        .get(job_name)
        .ok_or_else(|| ConfigError::UnknownJob(job_name.to_string()))?;

    let mode = Mode::parse(&raw_job.mode).ok_or_else(|| ConfigError::InvalidMode(raw_job.mode.clone()))?;

    dsp_filters::ExcludeSet::compile(&raw_job.exclude)
        .map_err(|err| ConfigError::InvalidExcludePattern(err.to_string()))?;

    let source_root = absolutize(&raw_job.source_root);
    let dest_root = absolutize(&raw_job.dest_root);

    fs::metadata(&source_root).map_err(|source| ConfigError::UnreadableRoot {
        path: source_root.clone(),
        source,
    })?;
    fs::create_dir_all(&dest_root).map_err(|source| ConfigError::UnreadableRoot {
        path: dest_root.clone(),
        source,
    })?;

    Ok(Job {
        name: job_name.to_string(),
        source_root,
        dest_root,
        mode,
        exclude: raw_job.exclude.clone(),
        safety_net_days: raw_job.safety_net_days,
        verify: raw_job.verify || overrides.verify,
        retries: raw_job.retries,
        threads: raw_job.threads,
        dry_run: overrides.dry_run,
        resume: overrides.resume,
    })
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_a_valid_job_with_overrides_applied() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();
        let dest = dir.path().join("dst");

        let config_path = dir.path().join("jobs.toml");
        fs::write(
            &config_path,
            format!(
                "[jobs.nightly]\nsource_root = \"{}\"\ndest_root = \"{}\"\nmode = \"clone\"\n",
                source.display(),
                dest.display()
            ),
        )
        .unwrap();

        let job = load_job(
            &config_path,
            "nightly",
            JobOverrides {
                dry_run: true,
                resume: false,
                verify: true,
            },
        )
        .unwrap();

        assert_eq!(job.name, "nightly");
        assert_eq!(job.mode, Mode::Clone);
        assert!(job.dry_run);
        assert!(job.verify);
        assert!(dest.is_dir(), "dest_root should be created eagerly");
    }

    #[test]
    fn unknown_job_name_is_reported() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("jobs.toml");
        fs::write(&config_path, "[jobs.nightly]\nsource_root = \".\"\ndest_root = \".\"\nmode = \"clone\"\n")
            .unwrap();

        let err = load_job(&config_path, "missing", JobOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownJob(name) if name == "missing"));
    }

    #[test]
    fn invalid_mode_is_reported() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();
        let config_path = dir.path().join("jobs.toml");
        fs::write(
            &config_path,
            format!(
                "[jobs.nightly]\nsource_root = \"{}\"\ndest_root = \"{}\"\nmode = \"mirror\"\n",
                source.display(),
                dir.path().join("dst").display()
            ),
        )
        .unwrap();

        let err = load_job(&config_path, "nightly", JobOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMode(mode) if mode == "mirror"));
    }

    #[test]
    fn unreadable_source_root_is_reported() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("jobs.toml");
        let missing_source = dir.path().join("nope");
        fs::write(
            &config_path,
            format!(
                "[jobs.nightly]\nsource_root = \"{}\"\ndest_root = \"{}\"\nmode = \"sync\"\n",
                missing_source.display(),
                dir.path().join("dst").display()
            ),
        )
        .unwrap();

        let err = load_job(&config_path, "nightly", JobOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnreadableRoot { .. }));
    }

    #[test]
    fn invalid_exclude_pattern_is_reported() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();
        let config_path = dir.path().join("jobs.toml");
        fs::write(
            &config_path,
            format!(
                "[jobs.nightly]\nsource_root = \"{}\"\ndest_root = \"{}\"\nmode = \"clone\"\nexclude = [\"[\"]\n",
                source.display(),
                dir.path().join("dst").display()
            ),
        )
        .unwrap();

        let err = load_job(&config_path, "nightly", JobOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidExcludePattern(_)));
    }
}

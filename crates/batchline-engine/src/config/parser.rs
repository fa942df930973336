//! Job YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};

use crate::config::types::JobConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Replace `${VAR_NAME}` references with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing: Vec<String> = Vec::new();
    let substituted = ENV_VAR_RE.replace_all(input, |cap: &Captures<'_>| {
        let name = &cap[1];
        std::env::var(name).unwrap_or_else(|_| {
            if !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
            String::new()
        })
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }
    Ok(substituted.into_owned())
}

/// Parse a job YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if substitution fails or the YAML does not describe a job.
pub fn parse_job_str(yaml_str: &str) -> Result<JobConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    serde_yaml::from_str(&substituted).context("Failed to parse job YAML")
}

/// Parse a job YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn parse_job(path: &Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file: {}", path.display()))?;
    parse_job_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("BL_TEST_DATA_DIR", "/srv/batch");
        let result = substitute_env_vars("path: ${BL_TEST_DATA_DIR}/customers.csv").unwrap();
        assert_eq!(result, "path: /srv/batch/customers.csv");
        std::env::remove_var("BL_TEST_DATA_DIR");
    }

    #[test]
    fn test_repeated_env_var() {
        std::env::set_var("BL_TEST_REPEAT", "x");
        let result = substitute_env_vars("${BL_TEST_REPEAT}-${BL_TEST_REPEAT}").unwrap();
        assert_eq!(result, "x-x");
        std::env::remove_var("BL_TEST_REPEAT");
    }

    #[test]
    fn test_no_env_vars_passthrough() {
        let input = "chunk_size: 10\nname: $HOME";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_missing_env_vars_all_reported_once() {
        let input = "${BL_MISSING_X} ${BL_MISSING_Y} ${BL_MISSING_X}";
        let err = substitute_env_vars(input).unwrap_err().to_string();
        assert!(err.contains("BL_MISSING_X, BL_MISSING_Y"), "got: {err}");
    }

    #[test]
    fn test_parse_job_from_string() {
        std::env::set_var("BL_TEST_CSV", "data/in.csv");
        let yaml = r#"
version: "1.0"
job: test
steps:
  - name: load
    chunk_size: 2
    reader:
      use: csv
      config:
        path: ${BL_TEST_CSV}
    writer:
      use: sqlite
"#;
        let config = parse_job_str(yaml).unwrap();
        assert_eq!(config.job, "test");
        assert_eq!(config.steps[0].reader.config["path"], "data/in.csv");
        std::env::remove_var("BL_TEST_CSV");
    }

    #[test]
    fn test_parse_invalid_yaml_errors() {
        let result = parse_job_str("steps: [unclosed");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_job_file_not_found() {
        let err = parse_job(Path::new("/nonexistent/job.yaml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Failed to read job file"));
    }

    #[test]
    fn test_parse_job_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.yaml");
        std::fs::write(
            &path,
            "version: \"1.0\"\njob: from_file\nsteps:\n  - name: a\n    chunk_size: 1\n    reader: { use: csv }\n    writer: { use: sqlite }\n",
        )
        .unwrap();
        let config = parse_job(&path).unwrap();
        assert_eq!(config.job, "from_file");
        assert_eq!(config.steps.len(), 1);
    }
}

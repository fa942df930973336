//! Job configuration: YAML types, parsing with env substitution, validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_job, parse_job_str, substitute_env_vars};
pub use types::{ComponentConfig, JobConfig, ProcessingConfig, StateConfig, StepConfig};
pub use validator::validate_job;

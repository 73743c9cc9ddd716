//! Runner label extraction from workflow definition files.
//!
//! Only two fields of a workflow document are consumed: the optional display
//! `name` of each job and its `runs-on` labels. The job identity used to match
//! live jobs is the display name when it is non-empty, else the job key.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::ParseError;

/// Job identity -> declared runner labels, in declaration order.
pub type JobLabels = BTreeMap<String, Vec<String>>;

#[derive(Debug, Deserialize)]
struct WorkflowDocument {
    /// A bare `jobs:` and `jobs: ~` are both null; treated like a missing key.
    #[serde(default)]
    jobs: Option<BTreeMap<String, JobEntry>>,
}

#[derive(Debug, Deserialize)]
struct JobEntry {
    #[serde(default)]
    name: Option<String>,

    #[serde(default, rename = "runs-on")]
    runs_on: Option<Value>,
}

/// A scalar label as written, numbers and booleans included.
fn scalar_label(value: &Value) -> Option<String> {
    match value {
        Value::String(label) => Some(label.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// `runs-on` is either a single label or a list of labels.
fn runs_on_labels(job: &str, runs_on: Value) -> Result<Vec<String>, ParseError> {
    let invalid = || {
        ParseError::new(format!(
            "jobs.{job}.runs-on: expected a label or a list of labels"
        ))
    };

    match runs_on {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| scalar_label(item).ok_or_else(invalid))
            .collect(),
        other => {
            let label = scalar_label(&other).ok_or_else(invalid)?;
            Ok(if label.is_empty() { Vec::new() } else { vec![label] })
        }
    }
}

/// Parse a workflow document into its job -> runner labels mapping.
///
/// Fails for the whole document when it is not YAML, has no `jobs` mapping,
/// or declares `runs-on` in any shape other than a scalar or a list of
/// scalars. A job without `runs-on` maps to an empty label list.
pub fn extract_job_labels(document: &str) -> Result<JobLabels, ParseError> {
    let parsed: WorkflowDocument = serde_yaml::from_str(document)?;
    let jobs = parsed
        .jobs
        .ok_or_else(|| ParseError::new("workflow document has no jobs"))?;

    jobs.into_iter()
        .map(|(key, job)| {
            let labels = match job.runs_on {
                Some(runs_on) => runs_on_labels(&key, runs_on)?,
                None => Vec::new(),
            };
            let identity = match job.name {
                Some(name) if !name.is_empty() => name,
                _ => key,
            };
            Ok((identity, labels))
        })
        .collect()
}

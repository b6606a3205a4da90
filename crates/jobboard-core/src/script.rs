//! Job script source.

use crate::{JobRecord, Result};

/// Produces the script a worker executes for a job.
pub trait ScriptSource: Send + Sync {
    fn script(&self, job: &JobRecord) -> Result<String>;
}

/// Reads the `script` string from the job payload, falling back to a
/// minimal bash script that only announces the job.
#[derive(Debug, Clone, Default)]
pub struct PayloadScriptSource;

impl ScriptSource for PayloadScriptSource {
    fn script(&self, job: &JobRecord) -> Result<String> {
        if let Some(script) = job.payload.get("script").and_then(|s| s.as_str()) {
            return Ok(script.to_string());
        }
        Ok(format!("#!/bin/bash\necho \"running job {}\"\n", job.job_id))
    }
}

//! Identifiers for sites, queues, jobs and workers.
//!
//! Sites, queue names and worker ids become segments of shared-store keys,
//! so they must be non-empty and free of whitespace and `:`. Job ids are
//! opaque and only need to be non-blank.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Invalid(format!("{} must not be empty", kind)));
    }
    if value.chars().any(|c| c.is_whitespace() || c == ':') {
        return Err(Error::Invalid(format!(
            "{} '{}' must not contain whitespace or ':'",
            kind, value
        )));
    }
    Ok(())
}

/// A tenant/environment partition. Every queue and worker lives in one site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct Site(String);

impl Site {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_segment("site", &name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Site {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Site> for String {
    fn from(value: Site) -> Self {
        value.0
    }
}

/// Name of a site-scoped FIFO queue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_segment("queue name", &name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for QueueName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

/// Globally unique, opaque job identifier supplied by the producer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::Invalid("job id must not be blank".to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl std::str::FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// A worker, addressed by the site it pulls from and its self-chosen id.
///
/// Workers are never created explicitly: they become known to the
/// reconciler on their first allocation and are alive while their
/// liveness key exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(try_from = "RawWorkerRef")]
#[display("{site}/{id}")]
pub struct WorkerRef {
    site: Site,
    id: String,
}

impl WorkerRef {
    pub fn new(site: Site, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_segment("worker id", &id)?;
        Ok(Self { site, id })
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Deserialize)]
struct RawWorkerRef {
    site: Site,
    id: String,
}

impl TryFrom<RawWorkerRef> for WorkerRef {
    type Error = Error;

    fn try_from(raw: RawWorkerRef) -> Result<Self> {
        Self::new(raw.site, raw.id)
    }
}

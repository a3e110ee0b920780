//! Project record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The project a deployment belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique project ID
    pub id: String,

    /// Human-readable project name
    pub name: String,

    /// Public URL of the live deployment, if any
    pub live_url: Option<String>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project record
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            live_url: None,
            updated_at: Utc::now(),
        }
    }
}

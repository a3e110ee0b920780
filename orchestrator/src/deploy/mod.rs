//! Deployment pipeline

pub mod github;
pub mod health;
pub mod orchestrator;
pub mod secrets;
pub mod supabase;
pub mod vercel;

pub use orchestrator::{DeployRequest, Orchestrator};

/// Deploy log line with a success glyph
pub(crate) fn ok_line(msg: impl AsRef<str>) -> String {
    format!("✓ {}", msg.as_ref())
}

/// Deploy log line with a warning glyph
pub(crate) fn warn_line(msg: impl AsRef<str>) -> String {
    format!("⚠ {}", msg.as_ref())
}

/// Deploy log line with a failure glyph
pub(crate) fn fail_line(msg: impl AsRef<str>) -> String {
    format!("✗ {}", msg.as_ref())
}

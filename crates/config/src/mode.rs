use crate::error::{Error, ErrorKind};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operating mode of the pipeline.
///
/// Detection runs in every mode except [`Disabled`](Self::Disabled); the
/// mode mostly changes what the rewrite step does with a manifest.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Cached stylesheets are served to everyone.
    #[display("enabled")]
    Enabled,
    /// Links are only annotated; original stylesheets are still served.
    #[display("stats")]
    Stats,
    /// Cached stylesheets are served to privileged viewers only.
    #[default]
    #[display("preview")]
    Preview,
    /// Nothing is detected or rewritten.
    #[display("disabled")]
    Disabled,
}

impl Mode {
    /// Whether pages should carry the usage detector.
    #[must_use]
    pub fn runs_detection(&self) -> bool {
        !matches!(self, Mode::Disabled)
    }

    /// Whether markup served to this viewer should be rewritten at all.
    #[must_use]
    pub fn rewrites_for(&self, privileged: bool) -> bool {
        match self {
            Mode::Disabled => false,
            Mode::Preview => privileged,
            Mode::Enabled | Mode::Stats => true,
        }
    }
}

impl FromStr for Mode {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enabled" => Ok(Mode::Enabled),
            "stats" => Ok(Mode::Stats),
            "preview" => Ok(Mode::Preview),
            "disabled" => Ok(Mode::Disabled),
            other => exn::bail!(ErrorKind::Invalid(format!("unknown mode `{other}`"))),
        }
    }
}

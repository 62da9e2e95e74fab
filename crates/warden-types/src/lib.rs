//! `warden-types` – shared vocabulary for the Warden pursuit stack.
//!
//! Holds the math primitives, the pursuit [`Objective`], and the
//! cross-crate [`WardenError`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod math;

pub use math::{Quaternion, Vec3};

/// What a pursuit robot is currently trying to do.
///
/// Set only by the controller's periodic re-evaluation; there is no way to
/// force an objective from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    /// Pursuit inactive: hold the current position.
    #[default]
    Rest,
    /// Actor visible, non-aggressive: keep a fixed stand-off distance.
    Follow,
    /// Actor visible, aggressive: head for the forecast position.
    Race,
    /// Actor hidden: head for the forecast position.
    Search,
}

impl Objective {
    /// The objective implied by one evaluation tick.
    ///
    /// An inactive pursuit always rests, whatever the visibility or
    /// aggression inputs say.
    pub fn decide(pursuit_active: bool, actor_visible: bool, aggressive: bool) -> Self {
        match (pursuit_active, actor_visible, aggressive) {
            (false, _, _) => Objective::Rest,
            (true, true, true) => Objective::Race,
            (true, true, false) => Objective::Follow,
            (true, false, _) => Objective::Search,
        }
    }

    /// Lowercase label used in logs and status output.
    pub fn as_str(self) -> &'static str {
        match self {
            Objective::Rest => "rest",
            Objective::Follow => "follow",
            Objective::Race => "race",
            Objective::Search => "search",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global error type spanning configuration, wiring, transport, and wire
/// format failures.
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// A required scene collaborator was not supplied at startup.
    #[error("Missing scene collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Wire format error: {0}")]
    Wire(String),
}

impl WardenError {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WardenError::Io {
            context: context.into(),
            source,
        }
    }
}

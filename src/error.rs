//! Error taxonomy for the decision core and configuration loading.
//!
//! None of the decision errors are fatal: the arbiter recovers from each one
//! locally and always emits a control intent.

use std::fmt;

use thiserror::Error;

/// Which bound stopped a search that never reached its goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    IterationCap,
    FrontierExhausted,
}

impl fmt::Display for SearchLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchLimit::IterationCap => write!(f, "iteration cap"),
            SearchLimit::FrontierExhausted => write!(f, "exhausted frontier"),
        }
    }
}

/// The advisory systems blended by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Advisor {
    Safety,
    Tactical,
    Search,
}

impl fmt::Display for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisor::Safety => write!(f, "safety advisor"),
            Advisor::Tactical => write!(f, "tactical advisor"),
            Advisor::Search => write!(f, "path search"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionError {
    #[error("no path found after expanding {expanded} nodes ({limit})")]
    NoPathFound { expanded: usize, limit: SearchLimit },

    #[error("goal lane {lane} is outside a {lane_count}-lane track, clamped to {clamped}")]
    InvalidGoalState {
        lane: usize,
        lane_count: usize,
        clamped: usize,
    },

    #[error("{advisor} unavailable: {reason}")]
    AdvisorUnavailable { advisor: Advisor, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_path_message_names_the_limit() {
        let err = DecisionError::NoPathFound {
            expanded: 12,
            limit: SearchLimit::IterationCap,
        };
        assert_eq!(
            err.to_string(),
            "no path found after expanding 12 nodes (iteration cap)"
        );
    }

    #[test]
    fn advisor_unavailable_message() {
        let err = DecisionError::AdvisorUnavailable {
            advisor: Advisor::Tactical,
            reason: "timed out".to_string(),
        };
        assert_eq!(err.to_string(), "tactical advisor unavailable: timed out");
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AnalyticsError;

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Startup,
    Midmarket,
    Enterprise,
}

impl Segment {
    pub fn all() -> &'static [Segment] {
        &[Segment::Startup, Segment::Midmarket, Segment::Enterprise]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Startup => "startup",
            Segment::Midmarket => "midmarket",
            Segment::Enterprise => "enterprise",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Segment::Startup => "Startup",
            Segment::Midmarket => "Mid-market",
            Segment::Enterprise => "Enterprise",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Segment {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(Segment::Startup),
            "midmarket" | "mid_market" | "mid-market" => Ok(Segment::Midmarket),
            "enterprise" => Ok(Segment::Enterprise),
            _ => Err(AnalyticsError::UnknownSegment(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Linkedin,
    Phone,
}

impl Channel {
    pub fn all() -> &'static [Channel] {
        &[Channel::Email, Channel::Linkedin, Channel::Phone]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Linkedin => "linkedin",
            Channel::Phone => "phone",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Email => "Email",
            Channel::Linkedin => "LinkedIn",
            Channel::Phone => "Phone",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "linkedin" => Ok(Channel::Linkedin),
            "phone" => Ok(Channel::Phone),
            _ => Err(AnalyticsError::UnknownChannel(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Goal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Meetings,
    Replies,
    Engagement,
    Pipeline,
}

impl Goal {
    pub fn as_str(self) -> &'static str {
        match self {
            Goal::Meetings => "meetings",
            Goal::Replies => "replies",
            Goal::Engagement => "engagement",
            Goal::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Goal {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meetings" => Ok(Goal::Meetings),
            "replies" => Ok(Goal::Replies),
            "engagement" => Ok(Goal::Engagement),
            "pipeline" => Ok(Goal::Pipeline),
            _ => Err(AnalyticsError::UnknownGoal(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybookStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

impl PlaybookStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybookStatus::Draft => "draft",
            PlaybookStatus::Active => "active",
            PlaybookStatus::Paused => "paused",
            PlaybookStatus::Completed => "completed",
            PlaybookStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PlaybookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlaybookStatus {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PlaybookStatus::Draft),
            "active" => Ok(PlaybookStatus::Active),
            "paused" => Ok(PlaybookStatus::Paused),
            "completed" => Ok(PlaybookStatus::Completed),
            "archived" => Ok(PlaybookStatus::Archived),
            _ => Err(AnalyticsError::UnknownStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a single playbook run.
///
/// `Unclassified` is never produced by the run-control layer; it is what an
/// unknown or future wire value decodes to, and it is excluded from every
/// completed-only calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
    #[serde(other)]
    Unclassified,
}

impl RunStatus {
    pub fn all() -> &'static [RunStatus] {
        &[
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Paused,
            RunStatus::Unclassified,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Paused => "paused",
            RunStatus::Unclassified => "unclassified",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Whether the run occupies its playbook's single active slot.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }

    pub fn can_transition_to(self, target: RunStatus) -> bool {
        matches!(
            (self, target),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Paused)
                | (RunStatus::Paused, RunStatus::Running)
        )
    }

    /// Validate a transition requested by the run-control layer.
    pub fn transition(self, target: RunStatus) -> crate::Result<RunStatus> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(AnalyticsError::InvalidTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "paused" => Ok(RunStatus::Paused),
            "unclassified" => Ok(RunStatus::Unclassified),
            _ => Err(AnalyticsError::UnknownStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

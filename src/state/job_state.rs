//! Job state definitions for tracking traversal progress
//!
//! A job moves `Init → FormLoaded → Submitted → Classified{..}` and then
//! into `Paginating`, `LinkFollowing` or `Terminal`. Any non-terminal state
//! may jump to `Terminal` (abandonment or cancellation).

use crate::classify::Classification;
use crate::CrawlError;
use std::fmt;

/// Represents the current state of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Nothing fetched yet
    Init,

    /// The search form has been loaded and parsed
    FormLoaded,

    /// The search (or stable route page 0) has been requested
    Submitted,

    /// The last entry or list page has been classified
    Classified(Classification),

    /// Waiting on the next list page
    Paginating,

    /// Following detail links of a list page
    LinkFollowing,

    /// Done; nothing more will be fetched
    Terminal,
}

impl JobState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }

    /// Checks whether the machine may move from this state to `next`
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use Classification as C;

        if self.is_terminal() {
            return false;
        }
        if next.is_terminal() {
            return true;
        }

        match (self, next) {
            (Self::Init, Self::FormLoaded | Self::Submitted) => true,
            (Self::FormLoaded, Self::Submitted) => true,
            (Self::Submitted, Self::Classified(_)) => true,
            (Self::Classified(C::List), Self::LinkFollowing | Self::Paginating) => true,
            (Self::LinkFollowing, Self::Paginating) => true,
            (Self::Paginating, Self::Classified(_)) => true,
            _ => false,
        }
    }

    /// Moves to `next`, rejecting transitions the machine does not allow
    ///
    /// # Returns
    ///
    /// * `Ok(JobState)` - The new state
    /// * `Err(CrawlError::InvalidTransition)` - The transition is not allowed
    pub fn transition(self, next: JobState) -> Result<JobState, CrawlError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CrawlError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::FormLoaded => f.write_str("form_loaded"),
            Self::Submitted => f.write_str("submitted"),
            Self::Classified(classification) => write!(f, "classified({})", classification),
            Self::Paginating => f.write_str("paginating"),
            Self::LinkFollowing => f.write_str("link_following"),
            Self::Terminal => f.write_str("terminal"),
        }
    }
}

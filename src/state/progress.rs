/// Counters of one crawl job
///
/// Owned by the job that updates them; never shared between jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobProgress {
    /// Fetches handed to the network fetcher, retries included
    pub fetches_issued: u32,

    /// Retries scheduled by the retry strategy
    pub retries_scheduled: u32,

    /// List pages processed
    pub pages_processed: u32,

    /// Detail links followed from list pages
    pub details_followed: u32,

    /// Records persisted
    pub records: u32,

    /// Failed persistence calls
    pub persistence_errors: u32,
}

impl JobProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Details that may still be followed under a total budget
    pub fn remaining_details(&self, max_total_details: u32) -> u32 {
        max_total_details.saturating_sub(self.details_followed)
    }
}

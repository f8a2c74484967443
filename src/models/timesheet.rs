use serde::{Deserialize, Serialize};

/// Read-only snapshot of a timesheet as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteTimesheet {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
    /// Kept as the raw server string; see `tracking::reconcile::parse_start_time`.
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl RemoteTimesheet {
    /// A timesheet is active when its status is "active" (any case) and it has no end time.
    pub fn is_active(&self) -> bool {
        let status_active = self
            .status
            .as_deref()
            .map(|status| status.trim().eq_ignore_ascii_case("active"))
            .unwrap_or(false);
        let open_ended = self
            .end_time
            .as_deref()
            .map(|end| end.trim().is_empty())
            .unwrap_or(true);

        status_active && open_ended
    }
}

/// Response body of the current-timesheet query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimesheetList {
    #[serde(default)]
    pub timesheets: Option<Vec<RemoteTimesheet>>,
}

impl TimesheetList {
    pub fn empty() -> Self {
        Self::default()
    }

    /// First active timesheet; the only one considered when restoring a session.
    pub fn find_active(&self) -> Option<&RemoteTimesheet> {
        self.timesheets
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|sheet| sheet.is_active())
    }
}

use std::fmt;

/// How a successful reconciliation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Everything the resource declares is in place.
    Converged,
    /// The resource no longer exists.
    Absent,
    /// The resource is being deleted; dependents go with it.
    Terminating,
    /// A World names a Game that does not exist.
    ParentMissing,
    /// A World's Game exists but is not ready yet.
    WaitingOnParent,
}

impl ReconcileOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcileOutcome::Converged => "converged",
            ReconcileOutcome::Absent => "absent",
            ReconcileOutcome::Terminating => "terminating",
            ReconcileOutcome::ParentMissing => "parent_missing",
            ReconcileOutcome::WaitingOnParent => "waiting_on_parent",
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

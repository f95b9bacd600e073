use super::{ActionFailure, ActionProgress, ExecutionStatus, Plan, PlanExecutor, PlannerError};

/// Plan executor that dispatches nothing.
///
/// Plans are recorded and reported as running. With `complete_after(n)` the
/// plan succeeds on the n-th poll after it started; otherwise the outcome is
/// set explicitly with [`DryRunExecutor::succeed`] or [`DryRunExecutor::fail`].
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    current: Option<Plan>,
    started: Vec<Plan>,
    cancels: usize,
    polls_since_start: u32,
    complete_after: Option<u32>,
    pending: Option<ExecutionStatus>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete_after(polls: u32) -> Self {
        Self {
            complete_after: Some(polls),
            ..Self::default()
        }
    }

    /// Finish the running plan successfully on the next poll.
    pub fn succeed(&mut self) {
        if self.current.is_some() {
            self.pending = Some(ExecutionStatus::Succeeded);
        }
    }

    /// Fail the running plan on the next poll.
    pub fn fail(&mut self, failures: Vec<ActionFailure>) {
        if self.current.is_some() {
            self.pending = Some(ExecutionStatus::Failed { failures });
        }
    }

    pub fn current(&self) -> Option<&Plan> {
        self.current.as_ref()
    }

    /// Every plan ever started, oldest first
    pub fn started(&self) -> &[Plan] {
        &self.started
    }

    /// Number of cancels that stopped a running plan
    pub fn cancels(&self) -> usize {
        self.cancels
    }
}

impl PlanExecutor for DryRunExecutor {
    fn start(&mut self, plan: &Plan) -> Result<(), PlannerError> {
        if plan.is_empty() {
            log::debug!("Starting empty plan");
        }
        self.current = Some(plan.clone());
        self.started.push(plan.clone());
        self.polls_since_start = 0;
        self.pending = None;
        Ok(())
    }

    fn cancel(&mut self) {
        if self.current.take().is_some() {
            self.cancels += 1;
        }
        self.pending = None;
    }

    fn poll(&mut self) -> ExecutionStatus {
        let Some(plan) = &self.current else {
            return ExecutionStatus::Idle;
        };

        self.polls_since_start += 1;
        if self.pending.is_none()
            && self
                .complete_after
                .map_or(false, |n| self.polls_since_start >= n)
        {
            self.pending = Some(ExecutionStatus::Succeeded);
        }

        if let Some(status) = self.pending.take() {
            self.current = None;
            return status;
        }

        let progress = plan
            .items
            .first()
            .map(|item| ActionProgress {
                action: item.action.clone(),
                progress: 0.0,
            })
            .into_iter()
            .collect();
        ExecutionStatus::Running { progress }
    }
}

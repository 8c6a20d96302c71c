use std::fmt;
use std::ops::ControlFlow;

/// Passes reported while computing pseudo-observations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Estimation on the complete sample.
    Full,
    /// Estimation with the individual of this index left out.
    LeaveOneOut(usize),
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full-sample pass"),
            Self::LeaveOneOut(i) => write!(f, "leave-one-out pass excluding individual {i}"),
        }
    }
}

/// Observer for the leave-one-out loop.
///
/// Returning [`ControlFlow::Break`] from [`on_pass_complete`] stops the loop
/// before the next pass starts.
///
/// [`on_pass_complete`]: LeaveOneOutObserver::on_pass_complete
pub trait LeaveOneOutObserver {
    fn on_start(&mut self, total_passes: usize) {
        let _ = total_passes;
    }
    fn on_pass_complete(&mut self, excluded: usize) -> ControlFlow<()> {
        let _ = excluded;
        ControlFlow::Continue(())
    }
    fn on_finish(&mut self) {}
}

#[derive(Default)]
pub struct NoopProgress;

impl LeaveOneOutObserver for NoopProgress {}

/// Stops the loop once `limit` leave-one-out passes have completed.
#[derive(Debug, Clone, Copy)]
pub struct StopAfter {
    limit: usize,
    completed: usize,
}

impl StopAfter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            completed: 0,
        }
    }
}

impl LeaveOneOutObserver for StopAfter {
    fn on_pass_complete(&mut self, excluded: usize) -> ControlFlow<()> {
        let _ = excluded;
        self.completed += 1;
        if self.completed >= self.limit {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

/// Operator control point before each major phase or round.
pub trait Consent: Send + Sync {
    /// Ask a yes/no question. `false` stops the phase.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Approves everything; used for unattended runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl Consent for AutoApprove {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

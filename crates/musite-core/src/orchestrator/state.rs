//! Run state machine.
//!
//! [`next_state`] is the whole transition table. Decision states are guard
//! evaluations; only `Implanting` and `ComputingPolarization` suspend.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Setup,
    ImplantDecision,
    Implanting,
    PolarizationDecision,
    PreparingPolarization,
    ComputingPolarization,
    Results,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Setup => "Setup",
            RunState::ImplantDecision => "ImplantDecision",
            RunState::Implanting => "Implanting",
            RunState::PolarizationDecision => "PolarizationDecision",
            RunState::PreparingPolarization => "PreparingPolarization",
            RunState::ComputingPolarization => "ComputingPolarization",
            RunState::Results => "Results",
            RunState::Done => "Done",
            RunState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase switches recorded at `Setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub do_implant: bool,
    pub do_polarization: bool,
}

/// Outcome of the work done in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed,
}

/// Transition table. Terminal states map to themselves.
pub fn next_state(state: RunState, flags: Flags, outcome: StepOutcome) -> RunState {
    use RunState::*;
    match (state, outcome) {
        (Setup, _) => ImplantDecision,
        (ImplantDecision, _) if flags.do_implant => Implanting,
        (ImplantDecision, _) => PolarizationDecision,
        (Implanting, StepOutcome::Succeeded) => PolarizationDecision,
        (Implanting, StepOutcome::Failed) => Failed,
        (PolarizationDecision, _) if flags.do_polarization => PreparingPolarization,
        (PolarizationDecision, _) => Results,
        (PreparingPolarization, _) => ComputingPolarization,
        // A failed sweep is reported from Results.
        (ComputingPolarization, _) => Results,
        (Results, StepOutcome::Succeeded) => Done,
        (Results, StepOutcome::Failed) => Failed,
        (Done, _) => Done,
        (Failed, _) => Failed,
    }
}

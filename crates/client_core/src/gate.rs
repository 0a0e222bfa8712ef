//! Decides when the selection warrants a consistency check and reconciles
//! check results with whatever the selection has become since.
//!
//! Every evaluation advances a generation counter. A [`CheckTicket`] remembers
//! the generation it was issued at, and [`ValidationGate::resolve`] only
//! applies an outcome whose generation is still current. Any edit made while
//! a check is in flight therefore turns its response stale, even when the
//! edits end up restoring a selection of the same shape.

use shared::{
    domain::Environment,
    protocol::{ValidationRequest, ValidationResult},
};
use tracing::warn;

use crate::{error::ValidationRequestError, selection::SelectionSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// Selection not full or no environment; result is always absent.
    Idle,
    /// A check for the current generation is outstanding.
    Pending,
    Resolved { valid: bool },
}

#[derive(Debug, Clone)]
pub struct CheckTicket {
    pub generation: u64,
    pub request: ValidationRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied { valid: bool },
    Stale,
}

#[derive(Debug, Clone)]
pub struct ValidationGate {
    generation: u64,
    phase: GatePhase,
    result: Option<ValidationResult>,
    in_flight: usize,
}

impl Default for ValidationGate {
    fn default() -> Self {
        Self::new()
    }
}

pub fn gate_condition_met(selection: &SelectionSet, environment: Option<&Environment>) -> bool {
    selection.is_full() && environment.is_some()
}

impl ValidationGate {
    pub fn new() -> Self {
        Self {
            generation: 0,
            phase: GatePhase::Idle,
            result: None,
            in_flight: 0,
        }
    }

    /// Re-evaluates after a mutation. Returns a ticket when a check must be
    /// issued for the current selection.
    pub fn evaluate(
        &mut self,
        selection: &SelectionSet,
        environment: Option<&Environment>,
    ) -> Option<CheckTicket> {
        self.generation = self.generation.wrapping_add(1);

        let location = match environment {
            Some(env) if gate_condition_met(selection, environment) => *env,
            _ => {
                self.phase = GatePhase::Idle;
                self.result = None;
                return None;
            }
        };

        self.phase = GatePhase::Pending;
        self.in_flight += 1;
        Some(CheckTicket {
            generation: self.generation,
            request: ValidationRequest {
                species: selection.iter().map(|entry| (**entry).clone()).collect(),
                location,
            },
        })
    }

    /// Applies the outcome of the check issued at `generation`, or discards
    /// it when the selection has moved on.
    pub fn resolve(
        &mut self,
        generation: u64,
        outcome: Result<ValidationResult, ValidationRequestError>,
    ) -> Resolution {
        self.in_flight = self.in_flight.saturating_sub(1);

        if generation != self.generation || self.phase != GatePhase::Pending {
            return Resolution::Stale;
        }

        let result = outcome.unwrap_or_else(|err| {
            warn!("gate: {err}; recording failed outcome for generation={generation}");
            ValidationResult::request_failed()
        });
        let valid = result.valid;
        self.phase = GatePhase::Resolved { valid };
        self.result = Some(result);
        Resolution::Applied { valid }
    }

    /// Forgets every outstanding check without applying an outcome. A
    /// pending gate drops back to `Idle`; a resolved verdict stays visible.
    pub fn abandon(&mut self) {
        self.in_flight = 0;
        if self.phase == GatePhase::Pending {
            self.generation = self.generation.wrapping_add(1);
            self.phase = GatePhase::Idle;
            self.result = None;
        }
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    pub fn result(&self) -> Option<&ValidationResult> {
        self.result.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Checks issued but not yet resolved, stale ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

#[cfg(test)]
#[path = "tests/gate_tests.rs"]
mod tests;

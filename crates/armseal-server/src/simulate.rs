//! Assignment balance simulation
//!
//! Runs many `start` calls against a seeded coin and reports how the two
//! arms split, overall and per scenario.

use armseal_core::{AssignmentService, ScenarioCatalog, SeededRandom};
use armseal_token::{Condition, SigningKey};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Write as _};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArmCounts {
    pub supportive: u64,
    pub informational: u64,
}

impl ArmCounts {
    fn add(&mut self, condition: Condition) {
        match condition {
            Condition::Supportive => self.supportive += 1,
            Condition::Informational => self.informational += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.supportive + self.informational
    }

    /// Fraction assigned to the supportive arm
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn supportive_share(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.supportive as f64 / total as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub starts: u64,
    pub overall: ArmCounts,
    pub by_scenario: BTreeMap<String, ArmCounts>,
}

impl Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        let _ = writeln!(out, "Assignment simulation (seed {}, {} starts)", self.seed, self.starts);
        let _ = writeln!(
            out,
            "  overall: supportive {} / informational {} ({:.2}% supportive)",
            self.overall.supportive,
            self.overall.informational,
            self.overall.supportive_share() * 100.0
        );
        for (scenario, counts) in &self.by_scenario {
            let _ = writeln!(
                out,
                "  {scenario}: supportive {} / informational {}",
                counts.supportive, counts.informational
            );
        }
        f.write_str(out.trim_end())
    }
}

/// Issue `starts` tokens, cycling through the catalog
///
/// # Errors
/// Returns the first assignment failure
pub fn simulate_assignments(
    key: SigningKey,
    catalog: Arc<ScenarioCatalog>,
    starts: u64,
    seed: u64,
) -> Result<SimulationReport, armseal_core::ExperimentError> {
    let ids: Vec<String> = catalog.scenarios().iter().map(|s| s.id.clone()).collect();
    let service = AssignmentService::new(key)
        .with_catalog(catalog)
        .with_random(Arc::new(SeededRandom::new(seed)));

    let mut overall = ArmCounts::default();
    let mut by_scenario: BTreeMap<String, ArmCounts> = BTreeMap::new();
    for (i, scenario_id) in (0..starts).zip(ids.iter().cycle()) {
        let assignment = service.start(scenario_id, Some(&format!("sim-{i}")))?;
        overall.add(assignment.condition());
        by_scenario
            .entry(scenario_id.clone())
            .or_default()
            .add(assignment.condition());
    }

    Ok(SimulationReport {
        seed,
        starts,
        overall,
        by_scenario,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SigningKey {
        SigningKey::from_secret([1u8; 32]).unwrap()
    }

    #[test]
    fn test_simulation_is_balanced_and_reproducible() {
        let catalog = Arc::new(ScenarioCatalog::builtin());
        let a = simulate_assignments(key(), catalog.clone(), 4_000, 11).unwrap();
        let b = simulate_assignments(key(), catalog, 4_000, 11).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.overall.total(), 4_000);
        assert_eq!(a.by_scenario.len(), 4);
        assert!(a.by_scenario.values().all(|c| c.total() == 1_000));
        assert!((a.overall.supportive_share() - 0.5).abs() < 0.05);
        assert!(a.to_string().contains("T4"));
    }
}

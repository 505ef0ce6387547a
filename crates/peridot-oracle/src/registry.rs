//! Oracle trait, invocation context, and dispatch.

use peridot_exec::{Cancellation, Executor};
use peridot_gen::QueryGenerator;

use crate::report::Report;

/// Everything one oracle invocation may touch. The generator owns the
/// schema state, run configuration and random source; the executor owns
/// the connection.
pub struct OracleCx<'a> {
    pub generator: &'a mut dyn QueryGenerator,
    pub executor: &'a mut dyn Executor,
    pub cancel: &'a Cancellation,
}

impl OracleCx<'_> {
    pub fn state(&self) -> &peridot_schema::State {
        self.generator.state()
    }

    pub fn config(&self) -> &peridot_gen::FuzzConfig {
        self.generator.config()
    }
}

/// A differential property over generated SQL.
///
/// `check` never fails: every executor error is folded into the report
/// per the engine's error taxonomy.
pub trait Oracle {
    fn name(&self) -> &'static str;
    fn check(&mut self, cx: &mut OracleCx<'_>) -> Report;
}

/// Names of every registered oracle, in dispatch order.
pub fn all_oracle_names() -> &'static [&'static str] {
    &[
        "norec",
        "tlp",
        "dqp",
        "dqe",
        "cert",
        "eet",
        "codd",
        "pqs",
        "impo",
        "ground_truth",
    ]
}

/// Instantiates an oracle by name.
pub fn oracle_by_name(name: &str) -> Option<Box<dyn Oracle>> {
    let oracle: Box<dyn Oracle> = match name {
        "norec" => Box::new(crate::norec::NoRec::default()),
        "tlp" => Box::new(crate::tlp::Tlp::default()),
        "dqp" => Box::new(crate::dqp::Dqp::default()),
        "dqe" => Box::new(crate::dqe::Dqe::default()),
        "cert" => Box::new(crate::cert::Cert::default()),
        "eet" => Box::new(crate::eet::Eet::default()),
        "codd" => Box::new(crate::codd::CoddTest::default()),
        "pqs" => Box::new(crate::pqs::Pqs::default()),
        "impo" => Box::new(crate::impo::Impo::default()),
        "ground_truth" => Box::new(crate::truth::GroundTruth::default()),
        _ => return None,
    };
    Some(oracle)
}

/// One instance of every oracle.
pub fn all_oracles() -> Vec<Box<dyn Oracle>> {
    all_oracle_names()
        .iter()
        .filter_map(|n| oracle_by_name(n))
        .collect()
}

/// Picks an oracle for the next worker iteration by config weight.
/// Unlisted oracles weigh 1, weight 0 disables; `None` only when every
/// oracle is disabled.
pub fn pick_oracle(
    rng: &mut dyn rand::RngCore,
    config: &peridot_gen::OracleConfig,
) -> Option<Box<dyn Oracle>> {
    use rand::Rng;

    let weights: Vec<(&str, u32)> = all_oracle_names()
        .iter()
        .map(|n| (*n, config.weights.get(*n).copied().unwrap_or(1)))
        .filter(|(_, w)| *w > 0)
        .collect();
    let total: u32 = weights.iter().map(|(_, w)| w).sum();
    if total == 0 {
        return None;
    }
    let mut roll = rng.gen_range(0..total);
    for (name, weight) in &weights {
        if roll < *weight {
            return oracle_by_name(name);
        }
        roll -= weight;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_resolves() {
        for name in all_oracle_names() {
            let oracle = oracle_by_name(name).unwrap();
            assert_eq!(oracle.name(), *name);
        }
        assert!(oracle_by_name("nope").is_none());
    }

    #[test]
    fn all_oracles_covers_registry() {
        assert_eq!(all_oracles().len(), all_oracle_names().len());
    }

    #[test]
    fn weighted_pick_respects_zero_weights() {
        use rand::SeedableRng;

        let mut config = peridot_gen::OracleConfig::default();
        for name in all_oracle_names() {
            config.weights.insert((*name).to_string(), 0);
        }
        config.weights.insert("dqe".to_string(), 3);

        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        for _ in 0..16 {
            let oracle = pick_oracle(&mut rng, &config).unwrap();
            assert_eq!(oracle.name(), "dqe");
        }

        config.weights.insert("dqe".to_string(), 0);
        assert!(pick_oracle(&mut rng, &config).is_none());
    }
}

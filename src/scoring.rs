use std::cmp::Ordering;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::FactorWeights;
use crate::factor::{Factor, PopulationStats, normalize};
use crate::mutant::Mutant;

/// One factor's share of a composite score.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct FactorScore {
    pub factor: Factor,

    /// Raw signal as supplied, if any.
    pub raw: Option<f64>,

    /// Value in [0,1] after normalization.
    pub normalized: f64,

    pub weight: f64,

    /// `weight * normalized`.
    pub contribution: f64,

    /// True when the signal was missing and the neutral default was used.
    pub imputed: bool,
}

/// Composite score plus its per-factor breakdown.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoreCard {
    pub composite: f64,
    pub factors: [FactorScore; 5],
}

impl ScoreCard {
    pub fn normalized(&self, factor: Factor) -> f64 {
        self.factors[factor.index()].normalized
    }

    /// Factors whose value was imputed (confidence discount, diagnostics only).
    pub fn imputed(&self) -> Vec<Factor> {
        self.factors
            .iter()
            .filter(|f| f.imputed)
            .map(|f| f.factor)
            .collect()
    }
}

/// A mutant together with its score card.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredMutant {
    pub mutant: Mutant,
    pub card: ScoreCard,
}

impl ScoredMutant {
    pub fn id(&self) -> &str {
        &self.mutant.id
    }

    pub fn score(&self) -> f64 {
        self.card.composite
    }

    pub fn cost_ms(&self) -> u64 {
        self.mutant.execution_cost_ms
    }
}

/// Weighted sum of normalized factor values, kept within [0,1].
pub fn compose(normalized: &[f64; 5], weights: &FactorWeights) -> f64 {
    let sum: f64 = Factor::ALL
        .iter()
        .map(|&f| weights.get(f) * normalized[f.index()])
        .sum();
    sum.clamp(0.0, 1.0)
}

/// Score one mutant against precomputed population statistics.
pub fn score(mutant: &Mutant, weights: &FactorWeights, stats: &PopulationStats) -> ScoreCard {
    let factors = Factor::ALL.map(|factor| {
        let raw = mutant.signal(factor);
        let n = normalize(factor, raw, stats);
        let weight = weights.get(factor);
        FactorScore {
            factor,
            raw,
            normalized: n.value,
            weight,
            contribution: weight * n.value,
            imputed: n.imputed,
        }
    });

    let normalized = factors.map(|f| f.normalized);

    ScoreCard {
        composite: compose(&normalized, weights),
        factors,
    }
}

/// Ranking order: composite desc, then normalized complexity desc, then id asc.
pub fn rank_cmp(a: &ScoredMutant, b: &ScoredMutant) -> Ordering {
    b.score()
        .total_cmp(&a.score())
        .then_with(|| {
            b.card
                .normalized(Factor::Complexity)
                .total_cmp(&a.card.normalized(Factor::Complexity))
        })
        .then_with(|| a.id().cmp(b.id()))
}

/// Score a whole batch and return it in ranking order.
///
/// Population ranges are computed first; every mutant is then scored
/// independently and in parallel against those ranges.
pub fn score_all(mutants: Vec<Mutant>, weights: &FactorWeights) -> Vec<ScoredMutant> {
    let stats = PopulationStats::compute(&mutants);
    debug!(?stats, "population ranges computed");

    let mut scored: Vec<ScoredMutant> = mutants
        .into_par_iter()
        .map(|mutant| {
            let card = score(&mutant, weights, &stats);
            ScoredMutant { mutant, card }
        })
        .collect();

    scored.sort_by(rank_cmp);

    let low_confidence = scored
        .iter()
        .filter(|s| s.card.factors.iter().any(|f| f.imputed))
        .count();
    info!(mutants = scored.len(), low_confidence, "scored batch");

    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutant::fixtures::mutant;
    use proptest::prelude::*;

    fn with_signals(id: &str, signals: &[(Factor, f64)]) -> Mutant {
        let mut m = mutant(id, 1, &[]);
        for &(f, v) in signals {
            m.factor_signals.insert(f, v);
        }
        m
    }

    fn only(factor: Factor) -> FactorWeights {
        let mut w = FactorWeights {
            historical: 0.0,
            complexity: 0.0,
            security: 0.0,
            recency: 0.0,
            bug_correlation: 0.0,
        };
        match factor {
            Factor::Historical => w.historical = 1.0,
            Factor::Complexity => w.complexity = 1.0,
            Factor::Security => w.security = 1.0,
            Factor::Recency => w.recency = 1.0,
            Factor::BugCorrelation => w.bug_correlation = 1.0,
        }
        w
    }

    #[test]
    fn composite_is_weighted_sum_of_normalized_factors() {
        let batch = vec![
            with_signals(
                "a",
                &[
                    (Factor::Historical, 0.8),
                    (Factor::Complexity, 10.0),
                    (Factor::Security, 1.0),
                    (Factor::Recency, 0.0),
                    (Factor::BugCorrelation, 4.0),
                ],
            ),
            with_signals(
                "b",
                &[
                    (Factor::Historical, 0.2),
                    (Factor::Complexity, 0.0),
                    (Factor::Security, 0.0),
                    (Factor::Recency, 100.0),
                    (Factor::BugCorrelation, 0.0),
                ],
            ),
        ];

        let scored = score_all(batch, &FactorWeights::default());
        assert_eq!(scored[0].id(), "a");

        // 0.30*0.8 + 0.25*1 + 0.20*1 + 0.15*1 + 0.10*1
        assert!((scored[0].score() - 0.94).abs() < 1e-9);
        // 0.30*0.2 + everything else at the bottom of its range
        assert!((scored[1].score() - 0.06).abs() < 1e-9);
        assert!(scored[0].card.imputed().is_empty());
    }

    #[test]
    fn missing_signals_are_neutral_and_reported() {
        let scored = score_all(
            vec![with_signals("a", &[(Factor::Historical, 1.0)])],
            &FactorWeights::default(),
        );

        let card = &scored[0].card;
        assert_eq!(card.imputed().len(), 4);
        assert!((card.composite - (0.30 + 0.70 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn extreme_signals_keep_scores_finite() {
        let batch = vec![
            with_signals("lo", &[(Factor::Complexity, -1e308), (Factor::Recency, f64::MAX)]),
            with_signals("hi", &[(Factor::Complexity, 1e308), (Factor::Recency, -f64::MAX)]),
        ];

        for s in score_all(batch, &FactorWeights::default()) {
            assert!((0.0..=1.0).contains(&s.score()), "{} scored {}", s.id(), s.score());
        }
    }

    #[test]
    fn ties_break_on_complexity_then_id() {
        let batch = vec![
            with_signals("c", &[(Factor::Historical, 0.5), (Factor::Complexity, 1.0)]),
            with_signals("b", &[(Factor::Historical, 0.5), (Factor::Complexity, 9.0)]),
            with_signals("a", &[(Factor::Historical, 0.5), (Factor::Complexity, 1.0)]),
        ];

        let scored = score_all(batch, &only(Factor::Historical));
        let order: Vec<&str> = scored.iter().map(|s| s.id()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn scoring_is_reproducible() {
        let batch: Vec<Mutant> = (0..200)
            .map(|i| {
                with_signals(
                    &format!("m{i:03}"),
                    &[
                        (Factor::Complexity, (i % 17) as f64),
                        (Factor::Recency, (i % 5) as f64),
                    ],
                )
            })
            .collect();

        let first = score_all(batch.clone(), &FactorWeights::default());
        let second = score_all(batch, &FactorWeights::default());
        assert_eq!(first, second);
    }

    fn arb_weights() -> impl Strategy<Value = FactorWeights> {
        prop::array::uniform5(0.0f64..1.0)
            .prop_filter("non-zero total", |xs| xs.iter().sum::<f64>() > 0.1)
            .prop_map(|xs| {
                let total: f64 = xs.iter().sum();
                FactorWeights {
                    historical: xs[0] / total,
                    complexity: xs[1] / total,
                    security: xs[2] / total,
                    recency: xs[3] / total,
                    bug_correlation: xs[4] / total,
                }
            })
    }

    proptest! {
        #[test]
        fn composite_is_monotonic_in_each_factor(
            weights in arb_weights(),
            values in prop::array::uniform5(0.0f64..0.999),
            which in 0usize..5,
            bump in 0.001f64..1.0,
        ) {
            let factor = Factor::ALL[which];
            let before = compose(&values, &weights);

            let mut raised = values;
            raised[which] = (raised[which] + bump).min(1.0);
            let after = compose(&raised, &weights);

            prop_assert!(after >= before);
            if weights.get(factor) > 1e-3 {
                prop_assert!(after > before);
            }
        }

        #[test]
        fn composite_stays_in_unit_interval(
            weights in arb_weights(),
            values in prop::array::uniform5(0.0f64..=1.0),
        ) {
            let c = compose(&values, &weights);
            prop_assert!((0.0..=1.0).contains(&c));
        }
    }
}

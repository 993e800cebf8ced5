use crate::core::constants::EPS_COST;
use rand::Rng;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamplingError {
    #[error("cannot choose {requested} items out of {available}")]
    TooManyItems { requested: usize, available: usize },

    #[error("negative choice weight at index {0}")]
    NegativeWeight(usize),
}

/// Choose `k` distinct indices with probability proportional to `weights`,
/// without replacement.  When every remaining weight is zero the draw falls
/// back to uniform.
pub fn weighted_choose(
    k: usize,
    weights: &[f64],
    rng: &mut impl Rng,
) -> Result<Vec<usize>, SamplingError> {
    if k > weights.len() {
        return Err(SamplingError::TooManyItems {
            requested: k,
            available: weights.len(),
        });
    }
    if let Some(bad) = weights.iter().position(|&w| w < 0.0) {
        return Err(SamplingError::NegativeWeight(bad));
    }
    let mut prob = weights.to_vec();
    let mut val: Vec<usize> = (0..weights.len()).collect();
    let mut live = weights.len();
    let mut chosen = Vec::with_capacity(k);
    for _ in 0..k {
        let total: f64 = prob[..live].iter().sum();
        let idx = if total <= 0.0 {
            rng.gen_range(0..live)
        } else {
            let r = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut idx = live - 1;
            for (i, &p) in prob[..live].iter().enumerate() {
                acc += p;
                if r < acc {
                    idx = i;
                    break;
                }
            }
            idx
        };
        chosen.push(val[idx]);
        // overwrite the drawn element with the last live one
        prob[idx] = prob[live - 1];
        val[idx] = val[live - 1];
        live -= 1;
    }
    Ok(chosen)
}

/// Single weighted draw.
pub fn weighted_int(weights: &[f64], rng: &mut impl Rng) -> Result<usize, SamplingError> {
    Ok(weighted_choose(1, weights, rng)?[0])
}

/// `k` distinct uniform indices in `[0, n)` via swap-remapping, so each
/// draw stays O(1) in the already-chosen set.
pub fn pick_few(k: usize, n: usize, rng: &mut impl Rng) -> Result<Vec<usize>, SamplingError> {
    if k > n {
        return Err(SamplingError::TooManyItems {
            requested: k,
            available: n,
        });
    }
    let mut remap: HashMap<usize, usize> = HashMap::new();
    let mut chosen = Vec::with_capacity(k);
    let mut live = n;
    for _ in 0..k {
        let mut drawn = rng.gen_range(0..live);
        while let Some(&translated) = remap.get(&drawn) {
            drawn = translated;
        }
        chosen.push(drawn);
        remap.insert(drawn, live - 1);
        live -= 1;
    }
    Ok(chosen)
}

/// `k` uniform indices in `[0, n)`, repeats allowed.
pub fn pick_with_repeat(k: usize, n: usize, rng: &mut impl Rng) -> Vec<usize> {
    (0..k).map(|_| rng.gen_range(0..n)).collect()
}

/// Random sign.
pub fn plus_minus(rng: &mut impl Rng) -> f64 {
    if rng.gen::<bool>() { 1.0 } else { -1.0 }
}

/// Reciprocal-cost fitness with a finite cap for near-zero costs, so a
/// perfect structure stays selectable without producing infinities.
pub fn cost_to_fitness(costs: &[f64]) -> Vec<f64> {
    costs
        .iter()
        .map(|&c| if c < EPS_COST { 1.0 / EPS_COST } else { 1.0 / c })
        .collect()
}

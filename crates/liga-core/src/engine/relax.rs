//! Least-squares refinement of a single atom position.
//!
//! A Levenberg-Marquardt loop over the pair-cost residuals: the outer loop
//! re-evaluates the structure cost and keeps the position only while it
//! strictly improves; the inner loop solves the damped normal equations of
//! the 3-parameter fit.

use crate::core::constants::{EPS_COST, TOL_R, eps_lt};
use nalgebra::{Matrix3, Point3, Vector3};

const MAX_RELAX: usize = 20;
const MAX_LM_ITERATIONS: usize = 500;
const LAMBDA_START: f64 = 1.0e-3;
const LAMBDA_LIMIT: f64 = 1.0e12;

/// Evaluation of the residual system at a trial position: the structure
/// cost, the residual vector and one Jacobian row per residual.
pub(crate) type Evaluation = (f64, Vec<f64>, Vec<Vector3<f64>>);

/// Refine `position` in place against the residual system produced by
/// `eval_at`.  The position is only updated when the cost strictly
/// improves.
pub(crate) fn relax_position<E>(mut eval_at: E, position: &mut Point3<f64>)
where
    E: FnMut(&Point3<f64>) -> Evaluation,
{
    let mut lo_cost = f64::INFINITY;
    let mut trial = *position;
    for _ in 0..MAX_RELAX {
        let (cost, _, _) = eval_at(&trial);
        if !eps_lt(cost, lo_cost) {
            break;
        }
        lo_cost = cost;
        *position = trial;
        if lo_cost < EPS_COST {
            break;
        }
        trial = lm_minimize(&mut eval_at, trial);
    }
}

fn lm_minimize<E>(eval_at: &mut E, start: Point3<f64>) -> Point3<f64>
where
    E: FnMut(&Point3<f64>) -> Evaluation,
{
    let mut x = start;
    let (_, mut residuals, mut jacobian) = eval_at(&x);
    if residuals.is_empty() {
        return x;
    }
    let mut ssq = sum_of_squares(&residuals);
    let mut lambda = LAMBDA_START;
    for _ in 0..MAX_LM_ITERATIONS {
        let mut jtj = Matrix3::zeros();
        let mut gradient = Vector3::zeros();
        for (row, &r) in jacobian.iter().zip(&residuals) {
            jtj += row * row.transpose();
            gradient += row * r;
        }
        if gradient.norm() < EPS_COST / TOL_R {
            break;
        }
        let mut damped = jtj;
        for i in 0..3 {
            damped[(i, i)] *= 1.0 + lambda;
        }
        let Some(chol) = damped.cholesky() else {
            lambda *= 10.0;
            if lambda > LAMBDA_LIMIT {
                break;
            }
            continue;
        };
        let step = chol.solve(&(-gradient));
        let trial = x + step;
        let (_, trial_res, trial_jac) = eval_at(&trial);
        let trial_ssq = sum_of_squares(&trial_res);
        if trial_ssq < ssq {
            x = trial;
            residuals = trial_res;
            jacobian = trial_jac;
            ssq = trial_ssq;
            lambda = (lambda / 10.0).max(1.0e-12);
            if step.norm() < TOL_R {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > LAMBDA_LIMIT {
                break;
            }
        }
    }
    x
}

fn sum_of_squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

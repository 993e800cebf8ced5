//! Numerical tolerances shared across the library.

/// Cost values below this threshold snap to exactly zero, so that an empty
/// or perfectly matched structure reports a badness of 0.0 despite round-off.
pub const EPS_COST: f64 = 1.0e-10;

/// Distances shorter than this are treated as degenerate geometry
/// (zero-length triangle base, coincident anchors).
pub const EPS_DISTANCE: f64 = 1.0e-6;

/// Position tolerance of the least-squares atom relaxation.
pub const TOL_R: f64 = 1.0e-8;

/// `a` is smaller than `b` beyond cost round-off.
pub fn eps_lt(a: f64, b: f64) -> bool {
    a < b - EPS_COST
}

/// `a` is larger than `b` beyond cost round-off.
pub fn eps_gt(a: f64, b: f64) -> bool {
    a > b + EPS_COST
}

//! Pair-distance cost evaluation for candidate atom positions.

pub mod crystal;
pub mod molecule;

pub use crystal::AtomCostCrystal;
pub use molecule::AtomCost;

use std::str::FromStr;

/// Penalty applied to the mismatch `dd` between a realised pair distance
/// and its nearest target distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PenaltyKind {
    /// `dd^2`, the default.
    #[default]
    Pow2,
    /// `|dd|`.
    Fabs,
    /// Square well: 0 inside the distance resolution, 1 outside.
    Well,
}

impl PenaltyKind {
    pub fn eval(self, dd: f64, tol_dd: f64) -> f64 {
        match self {
            PenaltyKind::Pow2 => dd * dd,
            PenaltyKind::Fabs => dd.abs(),
            PenaltyKind::Well => {
                if dd.abs() < tol_dd {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }
}

impl FromStr for PenaltyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pow2" => Ok(PenaltyKind::Pow2),
            "fabs" => Ok(PenaltyKind::Fabs),
            "well" => Ok(PenaltyKind::Well),
            other => Err(format!("unknown penalty function '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalty_kinds() {
        assert_eq!(PenaltyKind::Pow2.eval(-0.5, 0.1), 0.25);
        assert_eq!(PenaltyKind::Fabs.eval(-0.5, 0.1), 0.5);
        assert_eq!(PenaltyKind::Well.eval(0.05, 0.1), 0.0);
        assert_eq!(PenaltyKind::Well.eval(0.5, 0.1), 1.0);
    }

    #[test]
    fn penalty_from_str() {
        assert_eq!("pow2".parse(), Ok(PenaltyKind::Pow2));
        assert_eq!("fabs".parse(), Ok(PenaltyKind::Fabs));
        assert_eq!("well".parse(), Ok(PenaltyKind::Well));
        assert!("cubic".parse::<PenaltyKind>().is_err());
    }
}

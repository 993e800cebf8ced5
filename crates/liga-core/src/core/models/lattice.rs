use crate::core::constants::EPS_DISTANCE;
use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LatticeError {
    #[error("non-positive cell length {0}")]
    NonPositiveLength(f64),

    #[error("cell angle {0} lies outside (0, 180) degrees")]
    InvalidAngle(f64),

    #[error("cell angles {alpha}, {beta}, {gamma} do not close into a 3-D cell")]
    DegenerateAngles { alpha: f64, beta: f64, gamma: f64 },
}

/// Crystal lattice defined by the six cell parameters, with cached
/// cartesian and inverse bases.  Angles are in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    a: f64,
    b: f64,
    c: f64,
    alpha: f64,
    beta: f64,
    gamma: f64,
    /// Columns are the cartesian cell vectors va, vb, vc.
    base: Matrix3<f64>,
    inv_base: Matrix3<f64>,
}

impl Default for Lattice {
    fn default() -> Self {
        // unit cube, basis is its own inverse
        Self {
            a: 1.0,
            b: 1.0,
            c: 1.0,
            alpha: 90.0,
            beta: 90.0,
            gamma: 90.0,
            base: Matrix3::identity(),
            inv_base: Matrix3::identity(),
        }
    }
}

impl Lattice {
    /// Build a lattice from cell parameters, rejecting degenerate cells.
    ///
    /// The parameters arrive straight from user input (`latpar` on the
    /// command line or in the parameter file), so zero lengths, flat
    /// angles and angle triples with no 3-D realisation all surface as
    /// errors instead of a singular basis.
    pub fn new(
        a: f64,
        b: f64,
        c: f64,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) -> Result<Self, LatticeError> {
        for length in [a, b, c] {
            if !(length > 0.0) {
                return Err(LatticeError::NonPositiveLength(length));
            }
        }
        for angle in [alpha, beta, gamma] {
            if !(angle > 0.0 && angle < 180.0) {
                return Err(LatticeError::InvalidAngle(angle));
            }
        }
        let (ca, cb, cg) = (
            alpha.to_radians().cos(),
            beta.to_radians().cos(),
            gamma.to_radians().cos(),
        );
        let sg = gamma.to_radians().sin();
        // standard setting: va along x, vb in the xy plane
        let va = Vector3::new(a, 0.0, 0.0);
        let vb = Vector3::new(b * cg, b * sg, 0.0);
        let cy = (ca - cb * cg) / sg;
        let cz2 = 1.0 - cb * cb - cy * cy;
        if !(cz2 > 0.0) {
            return Err(LatticeError::DegenerateAngles { alpha, beta, gamma });
        }
        let vc = Vector3::new(c * cb, c * cy, c * cz2.sqrt());
        let base = Matrix3::from_columns(&[va, vb, vc]);
        let inv_base = base
            .try_inverse()
            .ok_or(LatticeError::DegenerateAngles { alpha, beta, gamma })?;
        Ok(Self {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
            base,
            inv_base,
        })
    }

    pub fn parameters(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.alpha, self.beta, self.gamma]
    }

    pub fn cartesian(&self, fractional: &Vector3<f64>) -> Vector3<f64> {
        self.base * fractional
    }

    pub fn fractional(&self, cartesian: &Vector3<f64>) -> Vector3<f64> {
        self.inv_base * cartesian
    }

    /// Cartesian length of a fractional vector.
    pub fn norm(&self, fractional: &Vector3<f64>) -> f64 {
        self.cartesian(fractional).norm()
    }

    /// Cartesian distance between two fractional positions.
    pub fn distance(&self, f0: &Vector3<f64>, f1: &Vector3<f64>) -> f64 {
        self.norm(&(f1 - f0))
    }

    /// Wrap fractional coordinates into [0, 1).
    pub fn ucv_fractional(&self, fractional: &Vector3<f64>) -> Vector3<f64> {
        fractional.map(|x| x - x.floor())
    }

    /// Wrap a cartesian position into the unit cell and snap fractional
    /// components that land within `EPS_DISTANCE` (cartesian metric) of a
    /// cell face back to zero, so round-off cannot leave an atom just under
    /// the far face.
    pub fn ucv_cartesian_adjusted(&self, cartesian: &Vector3<f64>) -> Vector3<f64> {
        let mut ucl = self.ucv_fractional(&self.fractional(cartesian));
        for i in 0..3 {
            let mut ucs0 = ucl;
            let mut ucs1 = ucl;
            ucs0[i] = 0.0;
            ucs1[i] = 1.0;
            let near_face = self.distance(&ucl, &ucs0) < EPS_DISTANCE
                || self.distance(&ucl, &ucs1) < EPS_DISTANCE;
            if near_face {
                ucl[i] = 0.0;
            }
        }
        self.cartesian(&ucl)
    }

    /// Longest body diagonal of the unit cell.  Wrapped equivalent
    /// positions can differ by up to this length, so periodic image
    /// searches extend their radius by it.
    pub fn max_ucell_diagonal(&self) -> f64 {
        let diagonals = [
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(1.0, 1.0, -1.0),
            Vector3::new(1.0, -1.0, 1.0),
            Vector3::new(-1.0, 1.0, 1.0),
        ];
        diagonals
            .iter()
            .map(|d| self.norm(d))
            .fold(0.0, f64::max)
    }
}

/// Integer lattice points whose cartesian length lies in [rmin, rmax].
///
/// Index bounds per axis come from the reciprocal row norms: the i-th
/// fractional coordinate of any cartesian vector of length r is at most
/// r times the norm of the i-th row of the inverse basis.
#[derive(Debug, Clone)]
pub struct PointsInSphere {
    points: Vec<Vector3<f64>>,
}

impl PointsInSphere {
    pub fn new(rmin: f64, rmax: f64, lattice: &Lattice) -> Self {
        let mut bounds = [0i64; 3];
        for i in 0..3 {
            let recip_norm = lattice.inv_base.row(i).norm();
            bounds[i] = (rmax * recip_norm).ceil() as i64;
        }
        let mut points = Vec::new();
        for m in -bounds[0]..=bounds[0] {
            for n in -bounds[1]..=bounds[1] {
                for o in -bounds[2]..=bounds[2] {
                    let cart =
                        lattice.cartesian(&Vector3::new(m as f64, n as f64, o as f64));
                    let r = cart.norm();
                    if r >= rmin && r <= rmax {
                        points.push(cart);
                    }
                }
            }
        }
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vector3<f64>> {
        self.points.iter()
    }
}

use crate::core::constants::EPS_DISTANCE;
use nalgebra::{Point3, Vector3};

/// Local coordinates of a triangle vertex placed against a base of length
/// `r01`, at distance `r02` from the base origin and `r12` from the base
/// end: `xlong` along the base, `xperp >= 0` perpendicular to it.
///
/// Returns `None` for a degenerate base or when no real vertex exists.
pub fn triangle_vertex(r01: f64, r02: f64, r12: f64) -> Option<(f64, f64)> {
    if r01 < EPS_DISTANCE {
        return None;
    }
    let xlong = (r02 * r02 + r01 * r01 - r12 * r12) / (2.0 * r01);
    let xp2 = r02 * r02 - xlong * xlong;
    let xp = xp2.abs().sqrt();
    if xp < EPS_DISTANCE {
        Some((xlong, 0.0))
    } else if xp2 < 0.0 {
        None
    } else {
        Some((xlong, xp))
    }
}

/// Deterministic unit vector perpendicular to `longdir`, built by crossing
/// with the cartesian axis along the smallest-magnitude component.
pub fn perpendicular_axis(longdir: &Vector3<f64>) -> Vector3<f64> {
    let abs = longdir.map(f64::abs);
    let ijk = if abs.x <= abs.y && abs.x <= abs.z {
        0
    } else if abs.y <= abs.z {
        1
    } else {
        2
    };
    let mut uv = Vector3::zeros();
    uv[ijk] = 1.0;
    longdir.cross(&uv).normalize()
}

/// Apex positions of a pyramid over base atoms `b0`, `b1`, `b2` with target
/// apex distances `r03`, `r13`, `r23` from the respective base corners.
///
/// Three regimes: apex on the `b0`-`b1` line, apex in the base plane, or a
/// mirrored pair above and below the plane.  Degenerate bases and
/// unsatisfiable distance triples yield no positions.
pub fn pyramid_apices(
    b0: &Point3<f64>,
    b1: &Point3<f64>,
    b2: &Point3<f64>,
    r03: f64,
    r13: f64,
    r23: f64,
) -> Vec<Point3<f64>> {
    let mut apices = Vec::new();
    // uvi is a unit vector in the b0-b1 direction
    let mut uvi = b1 - b0;
    let r01 = uvi.norm();
    if r01 < EPS_DISTANCE {
        return apices;
    }
    uvi /= r01;
    let v02 = b2 - b0;
    // uvj lies in the base plane, perpendicular to uvi
    let mut uvj = v02 - uvi * uvi.dot(&v02);
    let nm_uvj = uvj.norm();
    if nm_uvj < EPS_DISTANCE {
        return apices;
    }
    uvj /= nm_uvj;
    let uvk = uvi.cross(&uvj);
    let x_p1 = -0.5 / r01 * (r01 * r01 + r03 * r03 - r13 * r13);
    // translation from the pyramid frame back to the cartesian system
    let vt = b0.coords - x_p1 * uvi;
    let x_p3 = x_p1 + uvi.dot(&v02);
    let y_p3 = uvj.dot(&v02);
    let h2 = r03 * r03 - x_p1 * x_p1;
    if h2.abs() < EPS_DISTANCE {
        // apex sits on the b0-b1 line
        let p3_norm = (x_p3 * x_p3 + y_p3 * y_p3).sqrt();
        if (p3_norm - r03).abs() > EPS_DISTANCE {
            return apices;
        }
        apices.push(Point3::from(vt));
        return apices;
    } else if h2 < 0.0 {
        return apices;
    }
    let y_p4 = 0.5 / y_p3 * (h2 + x_p3 * x_p3 + y_p3 * y_p3 - r23 * r23);
    let z2_p4 = h2 - y_p4 * y_p4;
    if z2_p4.abs() < EPS_DISTANCE {
        // apex in the base plane
        apices.push(Point3::from(y_p4 * uvj + vt));
        return apices;
    } else if z2_p4 < 0.0 {
        return apices;
    }
    let z_p4 = z2_p4.sqrt();
    apices.push(Point3::from(y_p4 * uvj + z_p4 * uvk + vt));
    apices.push(Point3::from(y_p4 * uvj - z_p4 * uvk + vt));
    apices
}

use crate::core::constants::EPS_DISTANCE;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DistanceTableError {
    #[error("target distance table is empty")]
    Empty,

    #[error("non-positive entry in target distance table: {0}")]
    NonPositive(f64),

    #[error("table size {size} is not a triangular number, estimated atom count {estimate:.4}")]
    NotTriangular { size: usize, estimate: f64 },
}

/// Sorted multiset of target pair distances.
///
/// The table stays sorted ascending through every mutation; entries are
/// strictly positive.  Molecule searches hold a working copy that shrinks as
/// distances are consumed by realised pairs and grows back when atoms are
/// removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceTable {
    values: Vec<f64>,
    resolution: Option<f64>,
}

impl DistanceTable {
    pub fn new(mut values: Vec<f64>) -> Result<Self, DistanceTableError> {
        if values.is_empty() {
            return Err(DistanceTableError::Empty);
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        if values[0] <= 0.0 {
            return Err(DistanceTableError::NonPositive(values[0]));
        }
        Ok(Self {
            values,
            resolution: None,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Index of the entry numerically closest to `d`; ties break toward the
    /// smaller index.  O(log n).
    pub fn find_nearest(&self, d: f64) -> usize {
        debug_assert!(!self.values.is_empty());
        let upper = self.values.partition_point(|&v| v < d);
        if upper == self.values.len() {
            upper - 1
        } else if upper > 0 && d - self.values[upper - 1] <= self.values[upper] - d {
            upper - 1
        } else {
            upper
        }
    }

    /// Remove one occurrence at `position` and return the removed value.
    pub fn take_at(&mut self, position: usize) -> f64 {
        self.values.remove(position)
    }

    /// Insert `d` preserving the sort, returning the insertion index.
    pub fn return_back(&mut self, d: f64) -> usize {
        let position = self.values.partition_point(|&v| v < d);
        self.values.insert(position, d);
        position
    }

    /// Distinct values, collapsing entries closer than the table resolution.
    pub fn unique(&self) -> Vec<f64> {
        let eps = self.resolution.unwrap_or(EPS_DISTANCE);
        let mut rv: Vec<f64> = Vec::new();
        for &d in &self.values {
            match rv.last() {
                Some(&last) if d - last < eps => {}
                _ => rv.push(d),
            }
        }
        rv
    }

    pub fn count_unique(&self) -> usize {
        self.unique().len()
    }

    pub fn max_distance(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    /// Atom count N with N(N-1)/2 entries, when the size is exactly
    /// triangular.  Only meaningful for molecule targets.
    pub fn est_num_atoms(&self) -> Result<usize, DistanceTableError> {
        let size = self.values.len();
        let estimate = 0.5 + (1.0 + 8.0 * size as f64).sqrt() / 2.0;
        let natoms = estimate as usize;
        if natoms * (natoms - 1) / 2 != size {
            return Err(DistanceTableError::NotTriangular { size, estimate });
        }
        Ok(natoms)
    }

    pub fn resolution(&self) -> Option<f64> {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: f64) {
        self.resolution = Some(resolution);
    }
}

impl std::ops::Index<usize> for DistanceTable {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(values: &[f64]) -> DistanceTable {
        DistanceTable::new(values.to_vec()).unwrap()
    }

    #[test]
    fn construction_sorts_and_validates() {
        let t = table(&[3.0, 1.0, 2.0]);
        assert_eq!(t.as_slice(), &[1.0, 2.0, 3.0]);

        assert_eq!(DistanceTable::new(vec![]), Err(DistanceTableError::Empty));
        assert!(matches!(
            DistanceTable::new(vec![1.0, -2.0]),
            Err(DistanceTableError::NonPositive(_))
        ));
        assert!(matches!(
            DistanceTable::new(vec![0.0, 1.0]),
            Err(DistanceTableError::NonPositive(_))
        ));
    }

    #[test]
    fn find_nearest_prefers_smaller_index_on_tie() {
        let t = table(&[1.0, 2.0, 4.0]);
        assert_eq!(t.find_nearest(0.5), 0);
        assert_eq!(t.find_nearest(1.4), 0);
        assert_eq!(t.find_nearest(1.6), 1);
        // equidistant between 2.0 and 4.0
        assert_eq!(t.find_nearest(3.0), 1);
        assert_eq!(t.find_nearest(5.0), 2);
    }

    #[test]
    fn find_nearest_of_returned_value_points_back() {
        let mut t = table(&[1.0, 2.0, 3.0]);
        let pos = t.return_back(2.5);
        assert_eq!(t.find_nearest(2.5), pos);
    }

    #[test]
    fn take_and_return_round_trip_restores_table() {
        let initial = table(&[1.1, 2.2, 3.3, 4.4]);
        for k in 0..initial.len() {
            let mut t = initial.clone();
            let d = t.get(k);
            let pos = t.find_nearest(d);
            let taken = t.take_at(pos);
            assert_eq!(taken, d);
            t.return_back(taken);
            assert_eq!(t, initial);
        }
    }

    #[test]
    fn unique_collapses_close_values() {
        let mut t = table(&[1.0, 1.0, 1.0 + 1e-9, 2.0, 2.0, 3.0]);
        assert_eq!(t.unique(), vec![1.0, 2.0, 3.0]);
        assert_eq!(t.count_unique(), 3);
        t.set_resolution(1.5);
        assert_eq!(t.count_unique(), 2);
    }

    #[test]
    fn est_num_atoms_requires_triangular_size() {
        assert_eq!(table(&[1.0, 1.0, 1.0]).est_num_atoms().unwrap(), 3);
        assert_eq!(
            table(&[1.0; 6]).est_num_atoms().unwrap(),
            4,
            "6 distances make a 4-atom molecule"
        );
        assert!(matches!(
            table(&[1.0; 4]).est_num_atoms(),
            Err(DistanceTableError::NotTriangular { size: 4, .. })
        ));
    }

    #[test]
    fn max_distance_is_last_sorted_entry() {
        assert_eq!(table(&[5.0, 1.0, 3.0]).max_distance(), 5.0);
    }
}

use rand::Rng;

use crate::{error::SimError, types::GroupId};

/// Signed G×G table of how strongly each group is drawn to every other.
///
/// Entry `(a, b)` is the affinity a particle of group `a` feels toward a
/// particle of group `b`; positive attracts, negative repels. The table is
/// not required to be symmetric. Values are stored row-major and never
/// change after construction: a reset builds a new matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupAffinityMatrix {
    values: Vec<f32>,
    group_count: usize,
}

impl GroupAffinityMatrix {
    /// Samples every entry independently and uniformly from `range`.
    ///
    /// Entries are drawn row by row, so the same seeded `rng` always
    /// produces the same matrix.
    pub fn random(group_count: usize, range: (f32, f32), rng: &mut impl Rng) -> Self {
        let (min, max) = range;
        let values = (0..group_count * group_count)
            .map(|_| rng.random_range(min..=max))
            .collect();

        Self {
            values,
            group_count,
        }
    }

    /// Every entry set to `value`.
    pub fn uniform(group_count: usize, value: f32) -> Self {
        Self {
            values: vec![value; group_count * group_count],
            group_count,
        }
    }

    /// Builds a matrix from explicit row-major values.
    pub fn from_values(group_count: usize, values: Vec<f32>) -> Result<Self, SimError> {
        if group_count == 0 {
            return Err(SimError::NoGroups);
        }
        let expected = group_count * group_count;
        if values.len() != expected {
            return Err(SimError::AffinityShape {
                group_count,
                expected,
                got: values.len(),
            });
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(SimError::NonFiniteAffinity {
                a: idx / group_count,
                b: idx % group_count,
            });
        }

        Ok(Self {
            values,
            group_count,
        })
    }

    /// Affinity of group `a` toward group `b`.
    ///
    /// # Panics
    /// If either group is `>= group_count`. A column past the end would
    /// otherwise alias an entry of the next row.
    #[inline]
    pub fn get(&self, a: GroupId, b: GroupId) -> f32 {
        assert!(
            a < self.group_count && b < self.group_count,
            "affinity ({a}, {b}) out of range for {} groups",
            self.group_count
        );
        self.values[a * self.group_count + b]
    }

    /// Affinities of group `a` toward every group.
    ///
    /// # Panics
    /// If `a >= group_count`.
    pub fn row(&self, a: GroupId) -> &[f32] {
        assert!(
            a < self.group_count,
            "affinity row {a} out of range for {} groups",
            self.group_count
        );
        let start = a * self.group_count;
        &self.values[start..start + self.group_count]
    }

    pub fn group_count(&self) -> usize {
        self.group_count
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

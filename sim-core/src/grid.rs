//! Uniform spatial hash over the confinement cube.
//!
//! The grid covers `[-max_radius, max_radius]³` with `resolution³` cells and
//! is rebuilt from scratch every tick. Storage is a flat arena: all particle
//! ids sorted by bucket, plus one offset per bucket, filled by a parallel
//! counting sort. Positions outside the cube are clamped into the border
//! cells, so every particle lands in exactly one bucket.

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{IVec3, UVec3, Vec3};
use rayon::prelude::*;

use crate::{config::EnvironmentSettings, types::ParticleId};

/// Maps a world position to its integer cell coordinate.
///
/// The position is normalized into `[0, 1]³` relative to the confinement
/// cube, scaled by `resolution`, truncated and clamped per axis.
pub fn cell_coord(position: Vec3, max_radius: f32, resolution: u32) -> UVec3 {
    let unit = (position / max_radius) * 0.5 + 0.5;
    let scaled = unit * resolution as f32;
    let max = IVec3::splat(resolution as i32 - 1);
    scaled.as_ivec3().clamp(IVec3::ZERO, max).as_uvec3()
}

/// Order-sensitive key of a cell, `x + res * (y + res * z)`.
#[inline]
pub fn bucket_key(cell: UVec3, resolution: u32) -> usize {
    let res = resolution as usize;
    cell.x as usize + res * (cell.y as usize + res * cell.z as usize)
}

#[derive(Debug, Clone)]
pub struct SpatialHashGrid {
    resolution: u32,
    max_radius: f32,
    /// Cell of each particle, indexed by `ParticleId`.
    cells: Vec<UVec3>,
    /// `offsets[k]..offsets[k + 1]` is the slice of `contents` for bucket `k`.
    offsets: Vec<usize>,
    contents: Vec<ParticleId>,
}

impl SpatialHashGrid {
    /// Buckets every position for one tick.
    ///
    /// Keys and per-bucket counts are computed in parallel, offsets come from
    /// a sequential prefix sum, and particles are appended through atomic
    /// per-bucket cursors. Each bucket is then sorted by id so iteration
    /// order does not depend on thread scheduling.
    pub fn build(positions: &[Vec3], settings: &EnvironmentSettings) -> Self {
        let resolution = settings.grid_resolution.max(1);
        let max_radius = settings.max_radius;
        let bucket_count = (resolution as usize).pow(3);

        let cells: Vec<UVec3> = positions
            .par_iter()
            .map(|&p| cell_coord(p, max_radius, resolution))
            .collect();
        let keys: Vec<usize> = cells
            .par_iter()
            .map(|&c| bucket_key(c, resolution))
            .collect();

        let counts: Vec<AtomicUsize> = (0..bucket_count).map(|_| AtomicUsize::new(0)).collect();
        keys.par_iter().for_each(|&k| {
            counts[k].fetch_add(1, Ordering::Relaxed);
        });

        let mut offsets = Vec::with_capacity(bucket_count + 1);
        let mut total = 0;
        offsets.push(total);
        for count in &counts {
            total += count.load(Ordering::Relaxed);
            offsets.push(total);
        }

        let cursors: Vec<AtomicUsize> = offsets[..bucket_count]
            .iter()
            .map(|&o| AtomicUsize::new(o))
            .collect();
        let slots: Vec<AtomicUsize> = (0..positions.len()).map(|_| AtomicUsize::new(0)).collect();
        keys.par_iter().enumerate().for_each(|(id, &k)| {
            let slot = cursors[k].fetch_add(1, Ordering::Relaxed);
            slots[slot].store(id, Ordering::Relaxed);
        });

        let mut contents: Vec<ParticleId> =
            slots.into_iter().map(AtomicUsize::into_inner).collect();
        sort_buckets(&mut contents, &offsets);

        log::trace!(
            "built grid: {} particles in {} buckets ({}³)",
            positions.len(),
            bucket_count,
            resolution
        );

        Self {
            resolution,
            max_radius,
            cells,
            offsets,
            contents,
        }
    }

    /// Candidate neighbors of a particle: everything in the 3×3×3 block of
    /// cells around its own cell, clamped at the grid border.
    ///
    /// The particle itself is part of the result.
    pub fn neighbors(&self, id: ParticleId) -> impl Iterator<Item = ParticleId> + '_ {
        self.neighbors_of_cell(self.cells[id])
    }

    /// Same as [`Self::neighbors`] but for an arbitrary in-range cell.
    pub fn neighbors_of_cell(&self, cell: UVec3) -> impl Iterator<Item = ParticleId> + '_ {
        let lo = cell.saturating_sub(UVec3::ONE);
        let hi = (cell + UVec3::ONE).min(UVec3::splat(self.resolution - 1));

        (lo.z..=hi.z)
            .flat_map(move |z| {
                (lo.y..=hi.y).flat_map(move |y| (lo.x..=hi.x).map(move |x| UVec3::new(x, y, z)))
            })
            .flat_map(move |c| self.bucket(self.key(c)).iter().copied())
    }

    /// Particle ids in one bucket, in ascending order.
    pub fn bucket(&self, key: usize) -> &[ParticleId] {
        &self.contents[self.offsets[key]..self.offsets[key + 1]]
    }

    #[inline]
    pub fn key(&self, cell: UVec3) -> usize {
        bucket_key(cell, self.resolution)
    }

    /// Cell the particle was bucketed into this tick.
    pub fn cell_of(&self, id: ParticleId) -> UVec3 {
        self.cells[id]
    }

    /// Cell a world position would be bucketed into.
    pub fn cell_coord(&self, position: Vec3) -> UVec3 {
        cell_coord(position, self.max_radius, self.resolution)
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn cell_width(&self) -> f32 {
        2.0 * self.max_radius / self.resolution as f32
    }

    /// Number of particles in the grid.
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Number of buckets holding at least one particle.
    pub fn occupied_buckets(&self) -> usize {
        self.offsets.windows(2).filter(|w| w[1] > w[0]).count()
    }
}

/// Sorts each non-empty bucket slice of `contents` in parallel.
fn sort_buckets(contents: &mut [ParticleId], offsets: &[usize]) {
    let mut buckets: Vec<&mut [ParticleId]> = Vec::new();
    let mut rest = contents;
    for w in offsets.windows(2) {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(w[1] - w[0]);
        if head.len() > 1 {
            buckets.push(head);
        }
        rest = tail;
    }
    buckets.par_iter_mut().for_each(|b| b.sort_unstable());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_radius: f32, grid_resolution: u32) -> EnvironmentSettings {
        EnvironmentSettings {
            max_radius,
            grid_resolution,
            ..EnvironmentSettings::default()
        }
    }

    #[test]
    fn cell_coord_maps_center_and_clamps_outside() {
        // Origin sits at the low corner of the middle cell.
        assert_eq!(cell_coord(Vec3::ZERO, 10.0, 4), UVec3::splat(2));
        assert_eq!(cell_coord(Vec3::splat(-10.0), 10.0, 4), UVec3::ZERO);
        // Exactly on the upper face truncates to `res`, clamped to `res - 1`.
        assert_eq!(cell_coord(Vec3::splat(10.0), 10.0, 4), UVec3::splat(3));
        assert_eq!(
            cell_coord(Vec3::new(-100.0, 100.0, 0.0), 10.0, 4),
            UVec3::new(0, 3, 2)
        );
        // Non-finite positions still land in the grid.
        assert_eq!(cell_coord(Vec3::splat(f32::NAN), 10.0, 4), UVec3::ZERO);
    }

    #[test]
    fn bucket_key_is_order_sensitive() {
        let a = bucket_key(UVec3::new(1, 2, 3), 4);
        let b = bucket_key(UVec3::new(3, 2, 1), 4);
        assert_ne!(a, b);
        assert_eq!(a, 1 + 4 * (2 + 4 * 3));
        assert_eq!(bucket_key(UVec3::splat(3), 4), 63);
    }

    #[test]
    fn every_particle_lands_in_exactly_one_bucket() {
        let positions: Vec<Vec3> = (0..200)
            .map(|i| {
                let t = i as f32 * 0.37;
                Vec3::new(t.sin() * 12.0, t.cos() * 9.0, (t * 0.5).sin() * 30.0)
            })
            .collect();
        let grid = SpatialHashGrid::build(&positions, &settings(10.0, 8));

        assert_eq!(grid.len(), positions.len());

        let mut seen = vec![0u32; positions.len()];
        for key in 0..8usize.pow(3) {
            for &id in grid.bucket(key) {
                seen[id] += 1;
                assert_eq!(grid.key(grid.cell_of(id)), key);
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn buckets_are_sorted_by_id() {
        let positions = vec![Vec3::splat(1.0); 64];
        let grid = SpatialHashGrid::build(&positions, &settings(10.0, 4));

        let key = grid.key(grid.cell_of(0));
        let bucket = grid.bucket(key);
        assert_eq!(bucket, (0..64).collect::<Vec<_>>().as_slice());
        assert_eq!(grid.occupied_buckets(), 1);
    }

    #[test]
    fn neighbors_cover_adjacent_cells_only() {
        // Cell width 2.5 with radius 10 and resolution 8.
        let positions = vec![
            Vec3::new(0.1, 0.1, 0.1), // cell (4,4,4)
            Vec3::new(2.6, 0.1, 0.1), // cell (5,4,4), adjacent
            Vec3::new(5.1, 0.1, 0.1), // cell (6,4,4), two cells away
            Vec3::new(-2.4, -2.4, -2.4), // cell (3,3,3), diagonal neighbor
        ];
        let grid = SpatialHashGrid::build(&positions, &settings(10.0, 8));

        let mut n: Vec<ParticleId> = grid.neighbors(0).collect();
        n.sort_unstable();
        assert_eq!(n, vec![0, 1, 3]);

        let mut n: Vec<ParticleId> = grid.neighbors(2).collect();
        n.sort_unstable();
        assert_eq!(n, vec![1, 2]);
    }

    #[test]
    fn neighbors_clamp_at_the_border() {
        // One particle in every cell of a 3³ grid.
        let mut positions = Vec::new();
        for z in 0..3 {
            for y in 0..3 {
                for x in 0..3 {
                    let c = Vec3::new(x as f32, y as f32, z as f32);
                    positions.push((c + 0.5) / 3.0 * 2.0 - 1.0);
                }
            }
        }
        let grid = SpatialHashGrid::build(&positions, &settings(1.0, 3));

        // Corner cell sees a 2×2×2 block, the center cell sees everything.
        assert_eq!(grid.neighbors(0).count(), 8);
        assert_eq!(grid.neighbors(13).count(), 27);
        // Face center sees 3×3×2.
        assert_eq!(grid.neighbors(4).count(), 18);
    }

    #[test]
    fn single_cell_grid_returns_everyone() {
        let positions = vec![Vec3::splat(-5.0), Vec3::ZERO, Vec3::splat(5.0)];
        let grid = SpatialHashGrid::build(&positions, &settings(5.0, 1));

        let n: Vec<ParticleId> = grid.neighbors(1).collect();
        assert_eq!(n, vec![0, 1, 2]);
    }

    #[test]
    fn empty_input_builds_empty_grid() {
        let grid = SpatialHashGrid::build(&[], &settings(5.0, 4));
        assert!(grid.is_empty());
        assert_eq!(grid.occupied_buckets(), 0);
        assert_eq!(grid.neighbors_of_cell(UVec3::ZERO).count(), 0);
    }
}

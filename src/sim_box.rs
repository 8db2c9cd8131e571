use itertools::Itertools;
use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::particle::Particle;

/// Lennard-Jones pair energy in reduced units (ε = σ = 1) for a squared
/// separation `r2`.
///
/// No cutoff and no tail correction: the potential diverges as `r2 -> 0`.
#[inline]
pub fn lennard_jones(r2: f64) -> f64 {
    let r6 = r2 * r2 * r2;
    let r12 = r6 * r6;
    4.0 * (1.0 / r12 - 1.0 / r6)
}

#[inline]
fn wrap_coordinate(c: f64, size: f64) -> f64 {
    let wrapped = c.rem_euclid(size);
    // c slightly below zero can round up to exactly `size`
    if wrapped >= size {
        0.0
    } else {
        wrapped
    }
}

/// Cubic periodic cell holding the particle population.
#[derive(Debug, Clone)]
pub struct SimBox {
    size: f64,
    particles: Vec<Particle>,
}

impl SimBox {
    /// Create an empty box with edge length `size`.
    ///
    /// Non-positive or non-finite sizes are rejected.
    pub fn new(size: f64) -> Result<Self> {
        if !(size > 0.0) || !size.is_finite() {
            return Err(Error::invalid(format!(
                "box size must be positive and finite, got {size}"
            )));
        }
        Ok(Self {
            size,
            particles: Vec::new(),
        })
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn add_particle(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    pub fn clear_particles(&mut self) {
        self.particles.clear();
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Copy of every particle position, in collection order.
    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.particles.iter().map(Particle::position).collect()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.particles.len() {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.particles.len(),
            })
        }
    }

    pub fn particle(&self, index: usize) -> Result<&Particle> {
        self.check_index(index)?;
        Ok(&self.particles[index])
    }

    pub fn particle_mut(&mut self, index: usize) -> Result<&mut Particle> {
        self.check_index(index)?;
        Ok(&mut self.particles[index])
    }

    /// Apply the minimum-image convention to a raw separation vector.
    pub fn minimum_image(&self, mut d: Vector3<f64>) -> Vector3<f64> {
        for k in 0..3 {
            d[k] -= self.size * (d[k] / self.size).round();
        }
        d
    }

    fn pair_energy_at(&self, a: Vector3<f64>, b: Vector3<f64>) -> f64 {
        let rij = self.minimum_image(a - b);
        lennard_jones(rij.norm_squared())
    }

    /// Lennard-Jones energy between two particles under the minimum image.
    pub fn pair_potential(&self, p1: &Particle, p2: &Particle) -> f64 {
        self.pair_energy_at(p1.position(), p2.position())
    }

    /// Sum of the pair potential over all unordered pairs. O(N²).
    pub fn total_energy(&self) -> f64 {
        self.particles
            .iter()
            .tuple_combinations()
            .map(|(a, b)| self.pair_potential(a, b))
            .sum()
    }

    /// Total energy of the configuration in which particle `index` sits at
    /// `position` instead of its stored coordinates. The box is not touched.
    pub fn total_energy_with(&self, index: usize, position: Vector3<f64>) -> Result<f64> {
        self.check_index(index)?;
        let at = |k: usize| {
            if k == index {
                position
            } else {
                self.particles[k].position()
            }
        };
        Ok((0..self.particles.len())
            .tuple_combinations()
            .map(|(i, j)| self.pair_energy_at(at(i), at(j)))
            .sum())
    }

    /// Interaction energy of particle `index`, placed at `position`, with
    /// every other particle. O(N).
    pub fn particle_energy(&self, index: usize, position: Vector3<f64>) -> Result<f64> {
        self.check_index(index)?;
        Ok(self
            .particles
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != index)
            .map(|(_, other)| self.pair_energy_at(position, other.position()))
            .sum())
    }

    /// Map a position into `[0, size)` along every axis.
    pub fn wrap_position(&self, pos: Vector3<f64>) -> Vector3<f64> {
        pos.map(|c| wrap_coordinate(c, self.size))
    }

    /// Wrap a particle back into the box. Idempotent.
    pub fn apply_periodic_boundary(&self, particle: &mut Particle) {
        particle.set_position(self.wrap_position(particle.position()));
    }
}

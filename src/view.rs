use nalgebra::Vector3;

use crate::particle::Particle;
use crate::sim_box::SimBox;

/// Read-only borrow of the simulation box for renderers.
///
/// Holding a view blocks mutation of the owning [`Simulation`](crate::Simulation)
/// for its lifetime.
#[derive(Debug, Clone, Copy)]
pub struct BoxView<'a> {
    sim_box: &'a SimBox,
}

impl<'a> BoxView<'a> {
    pub fn new(sim_box: &'a SimBox) -> Self {
        Self { sim_box }
    }

    pub fn size(&self) -> f64 {
        self.sim_box.size()
    }

    pub fn particle_count(&self) -> usize {
        self.sim_box.particle_count()
    }

    pub fn particles(&self) -> &'a [Particle] {
        self.sim_box.particles()
    }

    pub fn positions(&self) -> impl Iterator<Item = Vector3<f64>> + 'a {
        self.sim_box.particles().iter().map(Particle::position)
    }

    /// Positions mapped from `[0, size)` onto the `[-1, 1]` display cube.
    pub fn normalized_positions(&self) -> Vec<Vector3<f64>> {
        let half = 0.5 * self.sim_box.size();
        self.positions()
            .map(|p| (p - Vector3::repeat(half)) / half)
            .collect()
    }

    /// Instantaneous total potential energy.
    pub fn total_energy(&self) -> f64 {
        self.sim_box.total_energy()
    }
}

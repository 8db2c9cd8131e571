use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A point particle in the simulation box.
///
/// Coordinates are unconstrained; wrapping into the box is the job of
/// [`SimBox::apply_periodic_boundary`](crate::SimBox::apply_periodic_boundary).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Particle {
    position: Vector3<f64>,
}

impl Particle {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
        }
    }

    pub fn from_position(position: Vector3<f64>) -> Self {
        Self { position }
    }

    /// Shift the particle in place by `delta`. No bounds checking.
    pub fn displace(&mut self, delta: Vector3<f64>) {
        self.position += delta;
    }

    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn set_position(&mut self, position: Vector3<f64>) {
        self.position = position;
    }

    pub fn x(&self) -> f64 {
        self.position.x
    }

    pub fn y(&self) -> f64 {
        self.position.y
    }

    pub fn z(&self) -> f64 {
        self.position.z
    }
}

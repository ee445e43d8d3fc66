extern crate nalgebra as na;

use na::DMatrix;

pub mod observers;
pub mod postprocessing;
pub mod preprocessing;
pub mod sim;

pub type ScalarField = DMatrix<f32>;
pub type VectorField = [ScalarField; 2];

pub mod batch;
pub mod blueprint;
pub mod bracketing;
pub mod demand;
pub mod elasticity;
pub mod general;
pub mod initial_guess;
pub mod pipeline;
pub mod production;
pub mod solver;
pub mod special;

pub use crate::domain::ports::{Pipeline, Storage, TaskFunction, TaskModel};
pub use crate::utils::error::Result;

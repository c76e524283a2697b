// Domain layer: value types and ports (interfaces). No numerics here.

pub mod model;
pub mod ports;

// Domain layer: entity models, billing rules and ports. Adapters implement the ports.

pub mod model;
pub mod period;
pub mod policy;
pub mod ports;

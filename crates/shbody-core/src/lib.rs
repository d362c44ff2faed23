pub mod bridge;
pub mod config;
pub mod constraint;
pub mod constraint_builder;
pub mod error;
pub mod math;
pub mod particle;
pub mod sh;
pub mod solver;
pub mod topology;
pub mod validator;

pub use bridge::{Material, MaterialProperties, PhysicsBridge, PhysicsState, PhysicsView, RebuildInput, TopologyKind};
pub use config::{IntegrationMethod, SolverConfig};
pub use constraint::{edge_key, Constraint, EdgeTag, Model, ShapeMatchingStrength};
pub use error::{Error, Result};
pub use math::{Mat3, Vec3};
pub use particle::{Particle, ParticleKind};
pub use sh::{CrossSection, SHBasis, SHGeometry, SurfaceMesh, SurfaceProjection};
pub use solver::Solver;
pub use topology::Topology;
pub use validator::{validate_constraint_semantics, ValidationReport};

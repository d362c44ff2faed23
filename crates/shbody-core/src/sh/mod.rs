pub mod basis;
pub mod geometry;

pub use basis::SHBasis;
pub use geometry::{CrossSection, SHGeometry, SurfaceMesh, SurfaceProjection};

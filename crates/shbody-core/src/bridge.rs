use std::collections::HashMap;

use crate::constraint::{Constraint, Model};
use crate::constraint_builder::{self, EdgeMaterial};
use crate::error::{Error, Result};
use crate::math::Vec3;
use crate::particle::{Particle, ParticleKind};
use crate::topology::Topology;

/// Per-point material sample (§6 `material.properties`/`get_material_at`).
#[derive(Clone, Copy, Debug)]
pub struct MaterialProperties {
    pub stiffness: f64,
    pub damping: f64,
    pub mass: Option<f64>,
}

/// Source of per-particle material, either a single uniform sample or a
/// callback evaluated at each point (§6 `material.uniform`).
pub enum Material<'a> {
    Uniform(MaterialProperties),
    PerPoint(&'a dyn Fn(Vec3) -> MaterialProperties),
}

impl Material<'_> {
    fn mass_at(&self, point: Vec3) -> Option<f64> {
        match self {
            Material::Uniform(p) => p.mass,
            Material::PerPoint(f) => f(point).mass,
        }
    }
}

/// Which `ConstraintBuilder` family a rebuild should use (§4.3 "according
/// to the topology kind", §4.4).
#[derive(Clone, Copy, Debug)]
pub enum TopologyKind {
    Cloth,
    Line { is_closed: bool },
    VolumeInternal,
    SkinBone,
    Structural2D,
}

/// Everything a rebuild needs from the external supplier (§6).
pub struct RebuildInput<'a> {
    pub surface_points: &'a [Vec3],
    pub internal_points: Option<&'a [Vec3]>,
    pub topology: &'a Topology,
    pub topology_kind: TopologyKind,
    pub model: Model,
    pub global_mass: f64,
    pub material: Material<'a>,
    pub fixed_particles: &'a [u32],
    pub forced: bool,
}

/// Owned physics state for one object: the backing storage a `PhysicsView`
/// borrows from (§5 "each object owns its PhysicsView backing storage").
#[derive(Clone, Debug)]
pub struct PhysicsState {
    pub particles: Vec<Particle>,
    pub constraints: Vec<Constraint>,
    pub surface_start: u32,
    pub surface_count: u32,
    pub internal_start: u32,
    pub internal_count: u32,
    pub model: Model,
    pub edge_count: usize,
    pub triangle_count: usize,
    pub topology_unchanged: bool,
}

impl PhysicsState {
    /// Borrow this object's backing storage for the duration of one solver
    /// step (§5 "zero-copy view").
    pub fn view(&mut self) -> PhysicsView<'_> {
        PhysicsView {
            particles: &mut self.particles,
            constraints: &mut self.constraints,
            surface_start: self.surface_start,
            surface_count: self.surface_count,
            internal_start: self.internal_start,
            internal_count: self.internal_count,
            model: self.model,
        }
    }
}

/// Borrowed bundle the Solver operates on; its sole handle on an object's
/// physical state for one step (§3 `PhysicsView`, §9 "zero-copy view").
pub struct PhysicsView<'a> {
    pub particles: &'a mut Vec<Particle>,
    pub constraints: &'a mut Vec<Constraint>,
    pub surface_start: u32,
    pub surface_count: u32,
    pub internal_start: u32,
    pub internal_count: u32,
    pub model: Model,
}

impl PhysicsView<'_> {
    /// Exit point of a step: publishes the mean particle velocity (§4.6
    /// step 10, §6 "Solver → Object").
    pub fn commit(&self) -> Vec3 {
        if self.particles.is_empty() {
            return Vec3::ZERO;
        }
        let sum = self.particles.iter().fold(Vec3::ZERO, |acc, p| acc + p.velocity);
        sum / self.particles.len() as f64
    }
}

/// Transforms surface samples + topology + material into a `PhysicsState`,
/// owning the reuse logic across rebuilds (§4.3).
pub struct PhysicsBridge;

impl PhysicsBridge {
    /// Pure w.r.t. geometry; only ever writes the physics state it returns
    /// (§4.3 "Rebuild procedure"). Aborts before writing anything on a
    /// topology error (§7 "Bridge errors abort the rebuild before any
    /// particle/constraint is written").
    pub fn rebuild(input: &RebuildInput, old: Option<&PhysicsState>) -> Result<PhysicsState> {
        let topology = input.topology;

        if !topology.edges.is_empty() && input.surface_points.is_empty() {
            return Err(Error::InvalidTopology(
                "edges present but surface_points is empty".into(),
            ));
        }
        if let Some(internal_edges) = &topology.internal_edges {
            if !internal_edges.is_empty() && input.internal_points.map_or(true, |p| p.is_empty()) {
                return Err(Error::InvalidTopology(
                    "internal_edges present but internal_points is missing".into(),
                ));
            }
        }
        if topology.triangles.as_ref().map_or(false, |t| !t.is_empty()) && !topology.is_closed {
            tracing::warn!("rebuild: triangles present on a topology that is not marked closed");
        }

        let surface_count = input.surface_points.len();
        let internal_count = input.internal_points.map_or(0, |p| p.len());
        let total = surface_count + internal_count;
        let default_mass = if total > 0 {
            input.global_mass / total as f64
        } else {
            0.0
        };

        let mut particles = Vec::with_capacity(total);
        for (i, &pos) in input.surface_points.iter().enumerate() {
            let mass = input.material.mass_at(pos).unwrap_or(default_mass);
            particles.push(Particle::new(i as u32, pos, mass, ParticleKind::Surface));
        }
        if let Some(internal) = input.internal_points {
            for (k, &pos) in internal.iter().enumerate() {
                let idx = (surface_count + k) as u32;
                let mass = input.material.mass_at(pos).unwrap_or(default_mass);
                particles.push(Particle::new(idx, pos, mass, ParticleKind::Internal));
            }
        }

        for &idx in input.fixed_particles {
            if let Some(p) = particles.get_mut(idx as usize) {
                p.pin();
            }
        }

        if let Some(prev) = old {
            let reuse_kinematics = !input.forced
                && prev.particles.len() == total
                && prev.surface_count as usize == surface_count
                && prev.internal_count as usize == internal_count
                && total > 0;
            if reuse_kinematics {
                for (p, old_p) in particles.iter_mut().zip(prev.particles.iter()) {
                    p.velocity = old_p.velocity;
                    p.prev_position = old_p.prev_position;
                    if old_p.fixed {
                        p.pin();
                    }
                }
            }
        }

        let edge_count = topology.edge_count();
        let triangle_count = topology.triangle_count();

        let reuse_constraints = old.is_some_and(|prev| {
            !input.forced
                && prev.topology_unchanged
                && prev.edge_count == edge_count
                && prev.triangle_count == triangle_count
        });
        let constraints = if reuse_constraints {
            old.unwrap().constraints.clone()
        } else {
            build_constraints(input, &particles)
        };

        let topology_unchanged = !input.forced
            && old.is_some_and(|prev| prev.edge_count == edge_count && prev.triangle_count == triangle_count);

        let mut state = PhysicsState {
            particles,
            constraints,
            surface_start: 0,
            surface_count: surface_count as u32,
            internal_start: surface_count as u32,
            internal_count: internal_count as u32,
            model: input.model,
            edge_count,
            triangle_count,
            topology_unchanged,
        };

        if let Some(triangles) = &topology.triangles {
            compute_normals(&mut state.particles, triangles, state.surface_count);
        }

        if state.internal_count > 0 {
            let indices: Vec<u32> =
                (state.internal_start..state.internal_start + state.internal_count).collect();
            constraint_builder::init_shape_matching_data(&mut state.particles, &indices);
        }

        Ok(state)
    }
}

fn material_arrays(material: &Material, particles: &[Particle]) -> (Option<Vec<f64>>, Option<Vec<f64>>, f64, f64) {
    match material {
        Material::Uniform(p) => (None, None, p.stiffness, p.damping),
        Material::PerPoint(f) => {
            let mut stiffness = Vec::with_capacity(particles.len());
            let mut damping = Vec::with_capacity(particles.len());
            for p in particles {
                let props = f(p.position);
                stiffness.push(props.stiffness);
                damping.push(props.damping);
            }
            (Some(stiffness), Some(damping), 1000.0, 1.0)
        }
    }
}

fn build_constraints(input: &RebuildInput, particles: &[Particle]) -> Vec<Constraint> {
    let positions: Vec<Vec3> = particles.iter().map(|p| p.position).collect();
    let (per_stiffness, per_damping, default_stiffness, default_damping) =
        material_arrays(&input.material, particles);
    let material = EdgeMaterial {
        per_particle_stiffness: per_stiffness.as_deref(),
        per_particle_damping: per_damping.as_deref(),
        default_stiffness,
        default_damping,
    };
    let topology = input.topology;

    match input.topology_kind {
        TopologyKind::Cloth => {
            let empty_internal_edges = Vec::new();
            let internal_edges = topology.internal_edges.as_deref().unwrap_or(&empty_internal_edges);
            let empty_map = HashMap::new();
            let edge_to_triangles = topology.edge_to_triangles.as_ref().unwrap_or(&empty_map);
            let empty_triangles = Vec::new();
            let triangles = topology.triangles.as_deref().unwrap_or(&empty_triangles);
            constraint_builder::build_cloth_constraints(
                &positions,
                &topology.edges,
                internal_edges,
                edge_to_triangles,
                triangles,
                input.model,
                &material,
            )
        }
        TopologyKind::Line { is_closed } => {
            let vertices: Vec<u32> = (0..positions.len() as u32).collect();
            constraint_builder::build_line_constraints(&positions, &vertices, input.model, &material, is_closed)
        }
        TopologyKind::VolumeInternal => {
            constraint_builder::build_volume_internal_constraints(&positions, &topology.edges, input.model, &material)
        }
        TopologyKind::SkinBone => {
            constraint_builder::build_skin_bone_constraints(&positions, &topology.edges, input.model, &material)
        }
        TopologyKind::Structural2D => {
            constraint_builder::build_2d_structural_constraints(&positions, &topology.edges, input.model, &material)
        }
    }
}

/// Zero all surface normals, accumulate unnormalized face normals from
/// `triangles`, then normalize with a `(0,1,0)` fallback (§4.5).
pub fn compute_normals(particles: &mut [Particle], triangles: &[(u32, u32, u32)], surface_count: u32) {
    for p in particles.iter_mut() {
        if p.kind == ParticleKind::Surface {
            p.normal = Vec3::ZERO;
        }
    }
    for &(i0, i1, i2) in triangles {
        if i0 >= surface_count || i1 >= surface_count || i2 >= surface_count {
            continue;
        }
        let (p0, p1, p2) = (
            particles[i0 as usize].position,
            particles[i1 as usize].position,
            particles[i2 as usize].position,
        );
        let face_normal = (p1 - p0).cross(p2 - p0);
        particles[i0 as usize].normal += face_normal;
        particles[i1 as usize].normal += face_normal;
        particles[i2 as usize].normal += face_normal;
    }
    for p in particles.iter_mut() {
        if p.kind == ParticleKind::Surface {
            let len = p.normal.length();
            p.normal = if len < 1e-10 { Vec3::Y } else { p.normal / len };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_topology() -> Topology {
        Topology {
            edges: vec![(0, 1), (1, 2), (2, 3), (3, 0)],
            triangles: Some(vec![(0, 1, 2), (0, 2, 3)]),
            internal_edges: None,
            edge_to_triangles: None,
            is_closed: false,
        }
    }

    fn quad_points() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn rebuild_builds_particles_and_constraints() {
        let topo = quad_topology();
        let points = quad_points();
        let input = RebuildInput {
            surface_points: &points,
            internal_points: None,
            topology: &topo,
            topology_kind: TopologyKind::Cloth,
            model: Model::Pbd,
            global_mass: 4.0,
            material: Material::Uniform(MaterialProperties {
                stiffness: 1000.0,
                damping: 1.0,
                mass: None,
            }),
            fixed_particles: &[0],
            forced: false,
        };
        let state = PhysicsBridge::rebuild(&input, None).unwrap();
        assert_eq!(state.particles.len(), 4);
        assert!(state.particles[0].fixed);
        assert_eq!(state.surface_count, 4);
        assert_eq!(state.constraints.len(), 4);
        for p in &state.particles {
            assert!((p.normal.length() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn rebuild_rejects_edges_without_surface_points() {
        let topo = quad_topology();
        let input = RebuildInput {
            surface_points: &[],
            internal_points: None,
            topology: &topo,
            topology_kind: TopologyKind::Cloth,
            model: Model::Pbd,
            global_mass: 1.0,
            material: Material::Uniform(MaterialProperties {
                stiffness: 1000.0,
                damping: 1.0,
                mass: None,
            }),
            fixed_particles: &[],
            forced: false,
        };
        assert!(matches!(
            PhysicsBridge::rebuild(&input, None),
            Err(Error::InvalidTopology(_))
        ));
    }

    #[test]
    fn unforced_rebuild_with_same_counts_reuses_velocity() {
        let topo = quad_topology();
        let points = quad_points();
        let material = || {
            Material::Uniform(MaterialProperties {
                stiffness: 1000.0,
                damping: 1.0,
                mass: None,
            })
        };
        let input1 = RebuildInput {
            surface_points: &points,
            internal_points: None,
            topology: &topo,
            topology_kind: TopologyKind::Cloth,
            model: Model::Pbd,
            global_mass: 4.0,
            material: material(),
            fixed_particles: &[],
            forced: false,
        };
        let mut first = PhysicsBridge::rebuild(&input1, None).unwrap();
        first.particles[1].velocity = Vec3::new(1.0, 2.0, 3.0);

        let input2 = RebuildInput {
            surface_points: &points,
            internal_points: None,
            topology: &topo,
            topology_kind: TopologyKind::Cloth,
            model: Model::Pbd,
            global_mass: 4.0,
            material: material(),
            fixed_particles: &[],
            forced: false,
        };
        let second = PhysicsBridge::rebuild(&input2, Some(&first)).unwrap();
        assert_eq!(second.particles[1].velocity, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn commit_returns_mean_velocity() {
        let mut state = PhysicsState {
            particles: vec![
                Particle::new(0, Vec3::ZERO, 1.0, ParticleKind::Surface),
                Particle::new(1, Vec3::ZERO, 1.0, ParticleKind::Surface),
            ],
            constraints: vec![],
            surface_start: 0,
            surface_count: 2,
            internal_start: 2,
            internal_count: 0,
            model: Model::Pbd,
            edge_count: 0,
            triangle_count: 0,
            topology_unchanged: false,
        };
        state.particles[0].velocity = Vec3::new(2.0, 0.0, 0.0);
        state.particles[1].velocity = Vec3::new(0.0, 0.0, 0.0);
        let view = state.view();
        assert_eq!(view.commit(), Vec3::new(1.0, 0.0, 0.0));
    }
}

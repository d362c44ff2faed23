use std::collections::HashMap;

use shbody_core::bridge::{Material, MaterialProperties, PhysicsBridge, RebuildInput, TopologyKind};
use shbody_core::config::IntegrationMethod;
use shbody_core::{Model, PhysicsState, SHGeometry, Solver, SolverConfig, Topology, Vec3};
use wasm_bindgen::prelude::*;

/// GPU-compatible particle struct: 32 bytes, matches the WGSL-side layout.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuParticle {
    position: [f32; 3], // 12 bytes
    fixed: f32,          //  4 bytes
    velocity: [f32; 3], // 12 bytes
    _pad: f32,          //  4 bytes
}

fn to_js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_vec3s(flat: &[f32]) -> Vec<Vec3> {
    flat.chunks_exact(3)
        .map(|c| Vec3::new(c[0] as f64, c[1] as f64, c[2] as f64))
        .collect()
}

fn to_pairs(flat: &[u32]) -> Vec<(u32, u32)> {
    flat.chunks_exact(2).map(|c| (c[0], c[1])).collect()
}

fn to_triples(flat: &[u32]) -> Vec<(u32, u32, u32)> {
    flat.chunks_exact(3).map(|c| (c[0], c[1], c[2])).collect()
}

/// Builds the edge -> (triangle, triangle) lookup `Topology` needs from a
/// flat triangle list, recording at most two incident faces per edge.
fn build_edge_to_triangles(
    triangles: &[(u32, u32, u32)],
) -> HashMap<(u32, u32), (Option<u32>, Option<u32>)> {
    let mut map: HashMap<(u32, u32), (Option<u32>, Option<u32>)> = HashMap::new();
    for (t, &(a, b, c)) in triangles.iter().enumerate() {
        let t = t as u32;
        for &(i, j) in &[(a, b), (b, c), (c, a)] {
            let key = shbody_core::edge_key(i, j);
            let entry = map.entry(key).or_insert((None, None));
            if entry.0.is_none() {
                entry.0 = Some(t);
            } else if entry.1.is_none() {
                entry.1 = Some(t);
            }
        }
    }
    map
}

fn empty_state() -> PhysicsState {
    PhysicsState {
        particles: Vec::new(),
        constraints: Vec::new(),
        surface_start: 0,
        surface_count: 0,
        internal_start: 0,
        internal_count: 0,
        model: Model::Pbd,
        edge_count: 0,
        triangle_count: 0,
        topology_unchanged: false,
    }
}

#[wasm_bindgen]
pub struct PhysicsWorld {
    state: PhysicsState,
    solver: Solver,
    gpu_buffer: Vec<GpuParticle>,
}

#[wasm_bindgen]
impl PhysicsWorld {
    #[wasm_bindgen(constructor)]
    pub fn new() -> PhysicsWorld {
        web_sys::console::log_1(&"WASM PhysicsWorld created".into());
        PhysicsWorld {
            state: empty_state(),
            solver: Solver::new(SolverConfig::default()),
            gpu_buffer: Vec::new(),
        }
    }

    #[wasm_bindgen]
    pub fn set_solver_config(
        &mut self,
        gravity_y: f32,
        gravity_enabled: bool,
        air_damping: f32,
        ground_y: f32,
        ground_restitution: f32,
        time_step: f32,
        substeps: u32,
        constraint_iterations: u32,
        constraint_relaxation: f32,
        collision_enabled: bool,
        self_collision_enabled: bool,
        collision_margin: f32,
        use_rk4: bool,
        tear_threshold_factor: f32,
    ) {
        self.solver.config = SolverConfig {
            gravity: Vec3::new(0.0, gravity_y as f64, 0.0),
            gravity_enabled,
            air_damping: air_damping as f64,
            ground_y: ground_y as f64,
            ground_restitution: ground_restitution as f64,
            time_step: time_step as f64,
            substeps,
            constraint_iterations,
            constraint_relaxation: constraint_relaxation as f64,
            collision_enabled,
            self_collision_enabled,
            collision_margin: collision_margin as f64,
            method: if use_rk4 {
                IntegrationMethod::Rk4
            } else {
                IntegrationMethod::Verlet
            },
            tear_threshold_factor: tear_threshold_factor as f64,
        };
    }

    /// Rebuilds the world as a single cloth patch. `points` and `fixed` are
    /// flat `[x,y,z, ...]` / index arrays; `edges` and `triangles` are flat
    /// index pairs/triples.
    #[wasm_bindgen]
    pub fn rebuild_cloth(
        &mut self,
        points: &[f32],
        edges: &[u32],
        triangles: &[u32],
        fixed: &[u32],
        stiffness: f32,
        damping: f32,
        mass_per_point: f32,
        forced: bool,
    ) -> Result<(), JsValue> {
        let surface_points = to_vec3s(points);
        let tri_list = to_triples(triangles);
        let topology = Topology {
            edges: to_pairs(edges),
            edge_to_triangles: Some(build_edge_to_triangles(&tri_list)),
            triangles: Some(tri_list),
            internal_edges: None,
            is_closed: false,
        };
        let material = Material::Uniform(MaterialProperties {
            stiffness: stiffness as f64,
            damping: damping as f64,
            mass: Some(mass_per_point as f64),
        });
        let input = RebuildInput {
            surface_points: &surface_points,
            internal_points: None,
            topology: &topology,
            topology_kind: TopologyKind::Cloth,
            model: Model::Pbd,
            global_mass: mass_per_point as f64 * surface_points.len() as f64,
            material,
            fixed_particles: fixed,
            forced,
        };
        let old = if forced { None } else { Some(&self.state) };
        self.state = PhysicsBridge::rebuild(&input, old).map_err(to_js_err)?;
        self.resize_gpu_buffer();
        self.write_gpu_output();
        Ok(())
    }

    /// Rebuilds the world as a single open or closed line of `vertices`.
    #[wasm_bindgen]
    pub fn rebuild_line(
        &mut self,
        points: &[f32],
        fixed: &[u32],
        stiffness: f32,
        damping: f32,
        mass_per_point: f32,
        is_closed: bool,
        forced: bool,
    ) -> Result<(), JsValue> {
        let surface_points = to_vec3s(points);
        let n = surface_points.len() as u32;
        let mut edges: Vec<(u32, u32)> = (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect();
        if is_closed && n > 2 {
            edges.push((n - 1, 0));
        }
        let topology = Topology {
            edges,
            triangles: None,
            internal_edges: None,
            edge_to_triangles: None,
            is_closed,
        };
        let material = Material::Uniform(MaterialProperties {
            stiffness: stiffness as f64,
            damping: damping as f64,
            mass: Some(mass_per_point as f64),
        });
        let input = RebuildInput {
            surface_points: &surface_points,
            internal_points: None,
            topology: &topology,
            topology_kind: TopologyKind::Line { is_closed },
            model: Model::Pbd,
            global_mass: mass_per_point as f64 * surface_points.len() as f64,
            material,
            fixed_particles: fixed,
            forced,
        };
        let old = if forced { None } else { Some(&self.state) };
        self.state = PhysicsBridge::rebuild(&input, old).map_err(to_js_err)?;
        self.resize_gpu_buffer();
        self.write_gpu_output();
        Ok(())
    }

    /// Advances the world by `dt` seconds and returns the wall-clock time
    /// the step took, in milliseconds.
    #[wasm_bindgen]
    pub fn step(&mut self, dt: f32) -> f32 {
        let start = js_sys::Date::now();
        let mut view = self.state.view();
        self.solver.step(std::slice::from_mut(&mut view), dt as f64);
        self.write_gpu_output();
        (js_sys::Date::now() - start) as f32
    }

    #[wasm_bindgen]
    pub fn particle_count(&self) -> usize {
        self.state.particles.len()
    }

    #[wasm_bindgen]
    pub fn constraint_count(&self) -> usize {
        self.state.constraints.len()
    }

    #[wasm_bindgen]
    pub fn get_buffer_ptr(&self) -> *const f32 {
        self.gpu_buffer.as_ptr() as *const f32
    }

    #[wasm_bindgen]
    pub fn get_buffer_byte_length(&self) -> usize {
        self.gpu_buffer.len() * std::mem::size_of::<GpuParticle>()
    }

    /// Runs the semantic validator over the current constraint set; returns
    /// the list of violation messages (empty when valid).
    #[wasm_bindgen]
    pub fn validate(&self) -> Vec<JsValue> {
        shbody_core::validate_constraint_semantics(&self.state.constraints)
            .errors
            .into_iter()
            .map(|e| JsValue::from_str(&e))
            .collect()
    }
}

impl PhysicsWorld {
    fn resize_gpu_buffer(&mut self) {
        self.gpu_buffer.resize(
            self.state.particles.len(),
            GpuParticle {
                position: [0.0; 3],
                fixed: 0.0,
                velocity: [0.0; 3],
                _pad: 0.0,
            },
        );
    }

    fn write_gpu_output(&mut self) {
        for (slot, p) in self.gpu_buffer.iter_mut().zip(self.state.particles.iter()) {
            slot.position = [p.position.x as f32, p.position.y as f32, p.position.z as f32];
            slot.fixed = if p.fixed { 1.0 } else { 0.0 };
            slot.velocity = [p.velocity.x as f32, p.velocity.y as f32, p.velocity.z as f32];
        }
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Thin wrapper exposing spherical-harmonic body queries to JS without
/// going through the particle solver -- used for preview rendering and for
/// seeding rest geometry before a `PhysicsWorld` rebuild.
#[wasm_bindgen]
pub struct ShBody {
    geometry: SHGeometry,
}

#[wasm_bindgen]
impl ShBody {
    #[wasm_bindgen(constructor)]
    pub fn new(max_order: usize, coeffs: &[f32], cx: f32, cy: f32, cz: f32) -> Result<ShBody, JsValue> {
        let coeffs: Vec<f64> = coeffs.iter().map(|&c| c as f64).collect();
        let center = Vec3::new(cx as f64, cy as f64, cz as f64);
        let geometry = SHGeometry::new(max_order, coeffs, center).map_err(to_js_err)?;
        Ok(ShBody { geometry })
    }

    #[wasm_bindgen]
    pub fn volume(&self) -> f64 {
        self.geometry.volume()
    }

    #[wasm_bindgen]
    pub fn surface_area(&self) -> f64 {
        self.geometry.surface_area()
    }

    #[wasm_bindgen]
    pub fn bounding_radius(&self) -> f64 {
        self.geometry.bounding_radius()
    }

    /// Flat `[x,y,z, ...]` buffer of a `(theta_steps+1) x phi_steps` surface
    /// grid, suitable for building a render mesh on the JS side.
    #[wasm_bindgen]
    pub fn sample_surface(&self, theta_steps: usize, phi_steps: usize) -> Vec<f32> {
        let mesh = self.geometry.sample_surface(theta_steps, phi_steps, false);
        mesh.points
            .iter()
            .flat_map(|p| [p.x as f32, p.y as f32, p.z as f32])
            .collect()
    }

    /// Projects `(x, y, z)` onto the surface; returns `[point, normal,
    /// distance, penetration]` flattened to 8 floats.
    #[wasm_bindgen]
    pub fn project_to_surface(&self, x: f32, y: f32, z: f32) -> Vec<f32> {
        let proj = self
            .geometry
            .project_to_surface(Vec3::new(x as f64, y as f64, z as f64));
        vec![
            proj.point.x as f32,
            proj.point.y as f32,
            proj.point.z as f32,
            proj.normal.x as f32,
            proj.normal.y as f32,
            proj.normal.z as f32,
            proj.distance as f32,
            proj.penetration as f32,
        ]
    }
}

use std::collections::HashMap;

use crate::constraint::{edge_key, Constraint, EdgeTag, Model, ShapeMatchingStrength};
use crate::error::Error;
use crate::math::Vec3;
use crate::particle::Particle;

/// Mirror a constraint set across a symmetry plane to build the other half
/// of a bilaterally symmetric body. Left unimplemented: the index-remapping
/// this needs depends on a mirror-vertex correspondence that topology
/// builders are not required to supply (§1, §9 Open Question).
pub fn duplicate_by_symmetry(_constraints: &[Constraint], _mirror_index: &[u32]) -> Result<Vec<Constraint>, Error> {
    Err(Error::Unimplemented("duplicate_by_symmetry"))
}

const DEFAULT_BEND_COMPLIANCE: f64 = 0.1;
const DEFAULT_LINE_BEND_COMPLIANCE: f64 = 0.05;

/// Per-edge stiffness/damping lookup: averages the endpoint arrays when
/// provided, otherwise falls back to a default (§4.4).
pub struct EdgeMaterial<'a> {
    pub per_particle_stiffness: Option<&'a [f64]>,
    pub per_particle_damping: Option<&'a [f64]>,
    pub default_stiffness: f64,
    pub default_damping: f64,
}

impl EdgeMaterial<'_> {
    fn at(&self, i: u32, j: u32) -> (f64, f64) {
        let stiffness = match self.per_particle_stiffness {
            Some(s) => (s[i as usize] + s[j as usize]) * 0.5,
            None => self.default_stiffness,
        };
        let damping = match self.per_particle_damping {
            Some(d) => (d[i as usize] + d[j as usize]) * 0.5,
            None => self.default_damping,
        };
        (stiffness, damping)
    }
}

fn structural_constraint(
    i: u32,
    j: u32,
    positions: &[Vec3],
    model: Model,
    stiffness: f64,
    damping: f64,
    tag: EdgeTag,
) -> Constraint {
    let rest_length = (positions[j as usize] - positions[i as usize]).length();
    match model {
        Model::Pbd => Constraint::Distance {
            i,
            j,
            rest_length,
            compliance: if stiffness > 0.0 { 1.0 / stiffness } else { 0.0 },
            lambda: 0.0,
            edge_tag: tag,
        },
        Model::Force => Constraint::Spring {
            i,
            j,
            rest_length,
            stiffness,
            damping,
            edge_tag: tag,
        },
    }
}

/// Find the triangle vertex that is neither `i` nor `j`.
fn opposite_corner(tri: (u32, u32, u32), i: u32, j: u32) -> Option<u32> {
    let (a, b, c) = tri;
    [a, b, c].into_iter().find(|&v| v != i && v != j)
}

/// `acos(clamp(n̂₁·n̂₂, -1, 1))` where `n1 = ab × ac`, `n2 = ab × ad`; `0` if
/// either face normal is degenerate (§4.4).
pub fn dihedral_rest_angle(positions: &[Vec3], a: u32, b: u32, c: u32, d: u32) -> f64 {
    let pa = positions[a as usize];
    let pb = positions[b as usize];
    let pc = positions[c as usize];
    let pd = positions[d as usize];
    let ab = pb - pa;
    let n1 = ab.cross(pc - pa);
    let n2 = ab.cross(pd - pa);
    let (n1_len, n2_len) = (n1.length(), n2.length());
    if n1_len < 1e-10 || n2_len < 1e-10 {
        return 0.0;
    }
    (n1 / n1_len).dot(n2 / n2_len).clamp(-1.0, 1.0).acos()
}

fn bending_constraint(i: u32, j: u32, c: u32, d: u32, positions: &[Vec3], model: Model) -> Constraint {
    match model {
        Model::Pbd => Constraint::Bending {
            a: i,
            b: j,
            c,
            d,
            rest_angle: dihedral_rest_angle(positions, i, j, c, d),
            compliance: DEFAULT_BEND_COMPLIANCE,
            lambda: 0.0,
        },
        Model::Force => {
            let rest_length = (positions[d as usize] - positions[c as usize]).length();
            Constraint::Spring {
                i: c,
                j: d,
                rest_length,
                stiffness: 100.0,
                damping: 5.0,
                edge_tag: EdgeTag::Bending,
            }
        }
    }
}

/// Cloth/shell constraints: a Distance or Spring per edge (Structural tag),
/// plus a Bending or Spring(Bending-tag) per internal edge whose two
/// incident triangles are both present (§4.4, `buildClothConstraints`).
pub fn build_cloth_constraints(
    positions: &[Vec3],
    edges: &[(u32, u32)],
    internal_edges: &[(u32, u32)],
    edge_to_triangles: &HashMap<(u32, u32), (Option<u32>, Option<u32>)>,
    triangles: &[(u32, u32, u32)],
    model: Model,
    material: &EdgeMaterial,
) -> Vec<Constraint> {
    let mut out = Vec::with_capacity(edges.len() + internal_edges.len());

    for &(i, j) in edges {
        let (stiffness, damping) = material.at(i, j);
        out.push(structural_constraint(
            i,
            j,
            positions,
            model,
            stiffness,
            damping,
            EdgeTag::Structural,
        ));
    }

    for &(i, j) in internal_edges {
        let key = edge_key(i, j);
        let Some(&(Some(t1), Some(t2))) = edge_to_triangles.get(&key) else {
            continue;
        };
        let (Some(tri1), Some(tri2)) = (triangles.get(t1 as usize), triangles.get(t2 as usize)) else {
            continue;
        };
        let (Some(c), Some(d)) = (opposite_corner(*tri1, i, j), opposite_corner(*tri2, i, j)) else {
            continue;
        };
        out.push(bending_constraint(i, j, c, d, positions, model));
    }

    out
}

/// `acos(clamp(v1·v2/(|v1||v2|), -1, 1))` for `v1 = p_j - p_i`,
/// `v2 = p_k - p_j`; `0` if either vector is near-zero (§4.6 LineBending).
fn line_bending_angle(p_i: Vec3, p_j: Vec3, p_k: Vec3) -> f64 {
    let v1 = p_j - p_i;
    let v2 = p_k - p_j;
    let (l1, l2) = (v1.length(), v2.length());
    if l1 < 1e-6 || l2 < 1e-6 {
        return 0.0;
    }
    (v1.dot(v2) / (l1 * l2)).clamp(-1.0, 1.0).acos()
}

/// Structural edges along an ordered polyline plus LineBending triples for
/// every interior vertex; if `is_closed` and `vertices.len() >= 3`, two
/// wrap-around triples are added (§4.4, `buildLineConstraints`).
pub fn build_line_constraints(
    positions: &[Vec3],
    vertices: &[u32],
    model: Model,
    material: &EdgeMaterial,
    is_closed: bool,
) -> Vec<Constraint> {
    let n = vertices.len();
    let mut out = Vec::new();
    if n < 2 {
        return out;
    }

    for w in vertices.windows(2) {
        let (i, j) = (w[0], w[1]);
        let (stiffness, damping) = material.at(i, j);
        out.push(structural_constraint(
            i,
            j,
            positions,
            model,
            stiffness,
            damping,
            EdgeTag::Structural,
        ));
    }
    if is_closed && n >= 2 {
        let (i, j) = (vertices[n - 1], vertices[0]);
        let (stiffness, damping) = material.at(i, j);
        out.push(structural_constraint(
            i,
            j,
            positions,
            model,
            stiffness,
            damping,
            EdgeTag::Structural,
        ));
    }

    let mut triple = |i: u32, j: u32, k: u32, out: &mut Vec<Constraint>| {
        let rest_angle = line_bending_angle(
            positions[i as usize],
            positions[j as usize],
            positions[k as usize],
        );
        out.push(Constraint::LineBending {
            i,
            j,
            k,
            rest_angle,
            compliance: DEFAULT_LINE_BEND_COMPLIANCE,
            lambda: 0.0,
        });
    };

    for w in vertices.windows(3) {
        triple(w[0], w[1], w[2], &mut out);
    }
    if is_closed && n >= 3 {
        triple(vertices[n - 2], vertices[n - 1], vertices[0], &mut out);
        triple(vertices[n - 1], vertices[0], vertices[1], &mut out);
    }

    out
}

/// Internal-volume structural edges: `stiffness = base * 5`,
/// `damping = base * 2` (§4.4).
pub fn build_volume_internal_constraints(
    positions: &[Vec3],
    edges: &[(u32, u32)],
    model: Model,
    material: &EdgeMaterial,
) -> Vec<Constraint> {
    edges
        .iter()
        .map(|&(i, j)| {
            let (base_stiffness, base_damping) = material.at(i, j);
            structural_constraint(
                i,
                j,
                positions,
                model,
                base_stiffness * 5.0,
                base_damping * 2.0,
                EdgeTag::Internal,
            )
        })
        .collect()
}

/// Skin-to-bone structural edges: `stiffness = base * 2`,
/// `damping = base * 1.5` (§4.4).
pub fn build_skin_bone_constraints(
    positions: &[Vec3],
    edges: &[(u32, u32)],
    model: Model,
    material: &EdgeMaterial,
) -> Vec<Constraint> {
    edges
        .iter()
        .map(|&(i, j)| {
            let (base_stiffness, base_damping) = material.at(i, j);
            structural_constraint(
                i,
                j,
                positions,
                model,
                base_stiffness * 2.0,
                base_damping * 1.5,
                EdgeTag::SkinBone,
            )
        })
        .collect()
}

/// Plain structural edges for flat 2D meshes; no bending pass (§4.4).
pub fn build_2d_structural_constraints(
    positions: &[Vec3],
    edges: &[(u32, u32)],
    model: Model,
    material: &EdgeMaterial,
) -> Vec<Constraint> {
    edges
        .iter()
        .map(|&(i, j)| {
            let (stiffness, damping) = material.at(i, j);
            structural_constraint(i, j, positions, model, stiffness, damping, EdgeTag::Structural)
        })
        .collect()
}

/// Compute the mass-weighted centroid of `indices` and set each particle's
/// `shape_matching_rest_offset` relative to it. Returns `None` if the total
/// mass is non-positive (§4.4, `initShapeMatchingData`).
pub fn init_shape_matching_data(particles: &mut [Particle], indices: &[u32]) -> Option<Vec3> {
    let mut total_mass = 0.0;
    let mut centroid = Vec3::ZERO;
    for &idx in indices {
        let mass = particles[idx as usize].mass;
        total_mass += mass;
        centroid += particles[idx as usize].position * mass;
    }
    if total_mass <= 0.0 {
        return None;
    }
    centroid /= total_mass;
    for &idx in indices {
        let p = &mut particles[idx as usize];
        p.shape_matching_rest_offset = Some(p.position - centroid);
    }
    Some(centroid)
}

/// Recompute rest offsets from an externally supplied set of ideal
/// positions (parallel to `indices`), mass-weighted (§4.4,
/// `updateShapeMatchingData`).
pub fn update_shape_matching_data(
    particles: &mut [Particle],
    ideal_positions: &[Vec3],
    indices: &[u32],
) -> Option<Vec3> {
    let mut total_mass = 0.0;
    let mut centroid = Vec3::ZERO;
    for (k, &idx) in indices.iter().enumerate() {
        let mass = particles[idx as usize].mass;
        total_mass += mass;
        centroid += ideal_positions[k] * mass;
    }
    if total_mass <= 0.0 {
        return None;
    }
    centroid /= total_mass;
    for (k, &idx) in indices.iter().enumerate() {
        particles[idx as usize].shape_matching_rest_offset = Some(ideal_positions[k] - centroid);
    }
    Some(centroid)
}

/// Emit one `ShapeMatching` constraint over `indices`, reading rest offsets
/// already set by `init_shape_matching_data`/`update_shape_matching_data`
/// (§4.4, `buildShapeMatchingConstraint`).
pub fn build_shape_matching_constraint(
    particles: &[Particle],
    indices: &[u32],
    model: Model,
    stiffness: f64,
) -> Constraint {
    let rest_offsets = indices
        .iter()
        .map(|&idx| particles[idx as usize].shape_matching_rest_offset.unwrap_or(Vec3::ZERO))
        .collect();
    let strength = match model {
        Model::Pbd => ShapeMatchingStrength::Compliance(if stiffness > 0.0 {
            1.0 / stiffness
        } else {
            0.0
        }),
        Model::Force => ShapeMatchingStrength::Stiffness(stiffness),
    };
    Constraint::ShapeMatching {
        indices: indices.to_vec(),
        rest_offsets,
        strength,
    }
}

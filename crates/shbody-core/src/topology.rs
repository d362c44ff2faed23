use std::collections::HashMap;

/// External topology description (an input, not owned state). Supplied by
/// the topology builder collaborator; the core never constructs one itself
/// from raw geometry (§1: topology builders are out of scope).
#[derive(Clone, Debug, Default)]
pub struct Topology {
    pub edges: Vec<(u32, u32)>,
    pub triangles: Option<Vec<(u32, u32, u32)>>,
    pub internal_edges: Option<Vec<(u32, u32)>>,
    /// Maps an edge key to the (up to two) triangles incident to it. A
    /// missing second triangle is represented as `None` rather than the
    /// `-1` sentinel used by the external wire format.
    pub edge_to_triangles: Option<HashMap<(u32, u32), (Option<u32>, Option<u32>)>>,
    pub is_closed: bool,
}

impl Topology {
    pub fn triangle_count(&self) -> usize {
        self.triangles.as_ref().map_or(0, |t| t.len())
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

use crate::math::Vec3;

/// Cloth edge class. Used only for tagging, tear eligibility, and
/// visualization -- it carries no solving semantics of its own.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EdgeTag {
    Structural,
    Shear,
    Bending,
    Surface,
    Internal,
    SkinBone,
}

/// Which constraint family a `PhysicsView` was built for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Model {
    Pbd,
    Force,
}

/// Shape matching is compliance-driven under PBD and stiffness-driven
/// under the force model; the two are never both present on one
/// constraint (§4.4, `buildShapeMatchingConstraint`).
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ShapeMatchingStrength {
    Compliance(f64),
    Stiffness(f64),
}

/// A tagged constraint variant, dispatched by `match` in the projection
/// loop rather than through a polymorphic base class (§9).
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// Positional (PBD/XPBD) distance constraint.
    Distance {
        i: u32,
        j: u32,
        rest_length: f64,
        compliance: f64,
        lambda: f64,
        edge_tag: EdgeTag,
    },
    /// Force-based Hookean spring.
    Spring {
        i: u32,
        j: u32,
        rest_length: f64,
        stiffness: f64,
        damping: f64,
        edge_tag: EdgeTag,
    },
    /// Dihedral bending across a shared edge `(a, b)` with opposite
    /// corners `c`, `d`.
    Bending {
        a: u32,
        b: u32,
        c: u32,
        d: u32,
        rest_angle: f64,
        compliance: f64,
        lambda: f64,
    },
    /// Three-point angle bending constraint for open/closed lines.
    LineBending {
        i: u32,
        j: u32,
        k: u32,
        rest_angle: f64,
        compliance: f64,
        lambda: f64,
    },
    /// Cluster-wise rigid restoration via shape matching.
    ShapeMatching {
        indices: Vec<u32>,
        rest_offsets: Vec<Vec3>,
        strength: ShapeMatchingStrength,
    },
}

impl Constraint {
    /// The canonical `(min, max)` key for constraints that sit on a single
    /// particle pair, or `None` for constraints that span more than two
    /// particles. Used by the Validator and the tearing pass to find
    /// whether a pair carries both a Distance and a Spring.
    pub fn edge_key(&self) -> Option<(u32, u32)> {
        match self {
            Constraint::Distance { i, j, .. } => Some(edge_key(*i, *j)),
            Constraint::Spring { i, j, .. } => Some(edge_key(*i, *j)),
            _ => None,
        }
    }

    pub fn edge_tag(&self) -> Option<EdgeTag> {
        match self {
            Constraint::Distance { edge_tag, .. } => Some(*edge_tag),
            Constraint::Spring { edge_tag, .. } => Some(*edge_tag),
            _ => None,
        }
    }
}

/// `edgeKey(i, j) = (min(i, j), max(i, j))` (§4.4).
#[inline]
pub fn edge_key(i: u32, j: u32) -> (u32, u32) {
    if i <= j {
        (i, j)
    } else {
        (j, i)
    }
}

use std::collections::HashMap;

use crate::constraint::Constraint;

/// Result of `validate_constraint_semantics`: advisory only, never
/// mutates and never aborts a rebuild on its own (§4.7, §7).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }
}

/// Static, pure check of a constraint set for semantic consistency
/// (§4.4 `validateConstraintSemantics`, §4.7). Does not mutate the
/// constraints or read particle state.
pub fn validate_constraint_semantics(constraints: &[Constraint]) -> ValidationReport {
    let mut errors = Vec::new();
    let mut seen_edges: HashMap<(u32, u32), &'static str> = HashMap::new();

    for (idx, c) in constraints.iter().enumerate() {
        match c {
            Constraint::Distance { rest_length, compliance, .. } => {
                if *compliance < 0.0 {
                    errors.push(format!("constraint {idx}: Distance has negative compliance"));
                }
                if !rest_length.is_finite() || *rest_length < 0.0 {
                    errors.push(format!("constraint {idx}: Distance missing a valid rest_length"));
                }
                if let Some(key) = c.edge_key() {
                    note_edge(&mut seen_edges, &mut errors, idx, key, "Distance");
                }
            }
            Constraint::Spring { rest_length, stiffness, .. } => {
                if *stiffness <= 0.0 {
                    errors.push(format!("constraint {idx}: Spring missing a positive stiffness"));
                }
                if !rest_length.is_finite() || *rest_length < 0.0 {
                    errors.push(format!("constraint {idx}: Spring missing a valid rest_length"));
                }
                if let Some(key) = c.edge_key() {
                    note_edge(&mut seen_edges, &mut errors, idx, key, "Spring");
                }
            }
            Constraint::Bending { rest_angle, compliance, .. } => {
                if !compliance.is_finite() {
                    errors.push(format!("constraint {idx}: Bending missing compliance"));
                }
                if !(0.0..=std::f64::consts::PI).contains(rest_angle) {
                    errors.push(format!("constraint {idx}: Bending rest_angle out of [0, pi]"));
                }
            }
            Constraint::LineBending { rest_angle, compliance, .. } => {
                if !compliance.is_finite() {
                    errors.push(format!("constraint {idx}: LineBending missing compliance"));
                }
                if !(0.0..=std::f64::consts::PI).contains(rest_angle) {
                    errors.push(format!("constraint {idx}: LineBending rest_angle out of [0, pi]"));
                }
            }
            Constraint::ShapeMatching { indices, rest_offsets, .. } => {
                if indices.is_empty() {
                    errors.push(format!("constraint {idx}: ShapeMatching has empty particles"));
                }
                if indices.len() != rest_offsets.len() {
                    errors.push(format!(
                        "constraint {idx}: ShapeMatching rest_offsets length {} does not match {} particles",
                        rest_offsets.len(),
                        indices.len()
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        ValidationReport::ok()
    } else {
        ValidationReport { valid: false, errors }
    }
}

fn note_edge(
    seen: &mut HashMap<(u32, u32), &'static str>,
    errors: &mut Vec<String>,
    idx: usize,
    key: (u32, u32),
    this_kind: &'static str,
) {
    match seen.insert(key, this_kind) {
        Some(other_kind) if other_kind != this_kind => {
            errors.push(format!(
                "constraint {idx}: edge {key:?} carries both Distance and Spring"
            ));
        }
        _ => {}
    }
}

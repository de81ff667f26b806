//! C5: class-definition ordering.
//!
//! A DEX verifier requires a class's superclass and interfaces to appear
//! earlier in `class_defs` than the class itself (forward references are
//! rejected at verification time even though nothing in the *container
//! format* enforces it). `assign_depths` computes each class's inheritance
//! depth by iterative fixed-point relaxation over the merged, deduplicated
//! class set; `topological_order` then sorts by `(depth, class_idx)` so
//! depth-0 (no merged supertype) classes sort first.

use std::collections::HashMap;

use crate::error::{MergeError, Result};
use crate::leb128::NO_INDEX;

/// The subset of a merged `class_def_item` the sort needs: its own type and
/// what it (directly) extends/implements, all already in merged-index space.
#[derive(Debug, Clone)]
pub struct SortableType {
    pub class_idx: u32,
    pub superclass_idx: i32,
    pub interface_idx: Vec<u32>,
}

/// Iteratively assign each class an inheritance depth: a class whose
/// supertypes are all external (not defined in this merge) or absent gets
/// depth 0; otherwise depth = 1 + max(supertype depths). Runs to a fixed
/// point rather than a single topological walk so that indirect cycles are
/// detected as non-convergence rather than silently truncated.
pub fn assign_depths(classes: &[SortableType]) -> Result<HashMap<u32, u32>> {
    let defined: HashMap<u32, &SortableType> =
        classes.iter().map(|c| (c.class_idx, c)).collect();
    let mut depth: HashMap<u32, u32> = classes.iter().map(|c| (c.class_idx, 0)).collect();

    let max_iterations = classes.len() + 1;
    for _ in 0..max_iterations {
        let mut changed = false;
        for c in classes {
            let mut parents = Vec::new();
            if c.superclass_idx != NO_INDEX {
                parents.push(c.superclass_idx as u32);
            }
            parents.extend(c.interface_idx.iter().copied());

            let mut new_depth = 0u32;
            for p in parents {
                if defined.contains_key(&p) {
                    new_depth = new_depth.max(depth[&p] + 1);
                }
            }
            let entry = depth.get_mut(&c.class_idx).unwrap();
            if *entry != new_depth {
                *entry = new_depth;
                changed = true;
            }
        }
        if !changed {
            return Ok(depth);
        }
    }
    Err(MergeError::MalformedInput(
        "class hierarchy does not converge: cyclic inheritance".into(),
    ))
}

/// Sort class indices by `(depth, class_idx)`.
pub fn topological_order(classes: &[SortableType], depth: &HashMap<u32, u32>) -> Vec<u32> {
    let mut order: Vec<u32> = classes.iter().map(|c| c.class_idx).collect();
    order.sort_by_key(|idx| (depth[idx], *idx));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sortable(class_idx: u32, superclass_idx: i32, interfaces: &[u32]) -> SortableType {
        SortableType {
            class_idx,
            superclass_idx,
            interface_idx: interfaces.to_vec(),
        }
    }

    #[test]
    fn independent_classes_all_depth_zero() {
        let classes = vec![sortable(1, NO_INDEX, &[]), sortable(2, NO_INDEX, &[])];
        let depth = assign_depths(&classes).unwrap();
        assert_eq!(depth[&1], 0);
        assert_eq!(depth[&2], 0);
    }

    #[test]
    fn linear_chain_increases_depth() {
        // 3 extends 2 extends 1 extends (external, not in this merge)
        let classes = vec![
            sortable(1, 100, &[]),
            sortable(2, 1, &[]),
            sortable(3, 2, &[]),
        ];
        let depth = assign_depths(&classes).unwrap();
        assert_eq!(depth[&1], 0);
        assert_eq!(depth[&2], 1);
        assert_eq!(depth[&3], 2);
        let order = topological_order(&classes, &depth);
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn interfaces_contribute_to_depth() {
        let classes = vec![
            sortable(1, NO_INDEX, &[]),
            sortable(2, NO_INDEX, &[]),
            sortable(3, NO_INDEX, &[1, 2]),
        ];
        let depth = assign_depths(&classes).unwrap();
        assert_eq!(depth[&3], 1);
    }

    #[test]
    fn cyclic_inheritance_is_rejected() {
        let classes = vec![sortable(1, 2, &[]), sortable(2, 1, &[])];
        let err = assign_depths(&classes).unwrap_err();
        assert!(matches!(err, MergeError::MalformedInput(_)));
    }

    #[test]
    fn topological_order_is_stable_within_a_depth() {
        let classes = vec![
            sortable(5, NO_INDEX, &[]),
            sortable(2, NO_INDEX, &[]),
            sortable(8, NO_INDEX, &[]),
        ];
        let depth = assign_depths(&classes).unwrap();
        let order = topological_order(&classes, &depth);
        assert_eq!(order, vec![2, 5, 8]);
    }
}

//! Dependency gate: is every declared dependency already completed?
//!
//! Only the task's own list is consulted. There is no transitive walk and no
//! cycle detection, so the check is a plain membership test and cannot loop.

use std::collections::HashSet;

use crate::task::TaskId;

pub fn dependencies_met(dependencies: &[TaskId], completed: &HashSet<TaskId>) -> bool {
    dependencies.iter().all(|dep| completed.contains(dep))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[TaskId]) -> HashSet<TaskId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn empty_dependencies_always_met() {
        assert!(dependencies_met(&[], &set(&[])));
        assert!(dependencies_met(&[], &set(&[1, 2, 3])));
    }

    #[test]
    fn all_dependencies_must_be_completed() {
        let done = set(&[1, 2]);
        assert!(dependencies_met(&[1, 2], &done));
        assert!(dependencies_met(&[2], &done));
        assert!(!dependencies_met(&[1, 3], &done));
        assert!(!dependencies_met(&[3], &set(&[])));
    }

    #[test]
    fn only_direct_dependencies_count() {
        // Task 2 depends on 1, and 1 itself depends on an unfinished 0.
        // Task 2 only cares that 1 is in the completed set.
        assert!(dependencies_met(&[1], &set(&[1])));
    }

    #[test]
    fn self_dependency_is_not_met_automatically() {
        assert!(!dependencies_met(&[7], &set(&[1, 2])));
        assert!(dependencies_met(&[7], &set(&[7])));
    }
}

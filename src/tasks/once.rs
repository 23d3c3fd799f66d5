//! # Process-wide once-only registry.
//!
//! Tasks configured with [`Task::run_only_once`](crate::Task::run_only_once)
//! register here under their identity key at admission. The first admission
//! wins; duplicates are admitted as no-ops and observe the winner through
//! the task operations (`has_finished`, `wait_for_finish`). The winning task
//! removes its entry on completion.
//!
//! Module state with explicit teardown: nothing outside the task operations
//! touches the map, and tests can reset it with [`clear`].

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::state::AbstractTask;

fn registry() -> &'static DashMap<String, Arc<dyn AbstractTask>> {
    static REGISTRY: OnceLock<DashMap<String, Arc<dyn AbstractTask>>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// Compare-and-insert admission: returns `true` when `task` became the
/// winning entry for `key`, `false` when a prior entry exists.
pub(crate) fn try_register(key: &str, task: Arc<dyn AbstractTask>) -> bool {
    match registry().entry(key.to_owned()) {
        dashmap::mapref::entry::Entry::Occupied(_) => false,
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            slot.insert(task);
            true
        }
    }
}

/// The effective (winning) task for `key`, if one is still registered.
pub(crate) fn effective_task(key: &str) -> Option<Arc<dyn AbstractTask>> {
    registry().get(key).map(|entry| Arc::clone(entry.value()))
}

/// Removes the entry for `key` when it belongs to the task with `task_id`.
pub(crate) fn remove_if_same(key: &str, task_id: u64) {
    registry().remove_if(key, |_, task| task.state().id() == task_id);
}

/// Drops every entry. Test teardown only.
#[cfg(test)]
pub(crate) fn clear() {
    registry().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::priority::Priority;
    use crate::tasks::state::Owner;
    use crate::tasks::Task;
    use std::sync::Weak;

    fn keyed_task(key: &str) -> Task {
        let task = Task::new(
            Owner::Executor(Weak::new()),
            "registry-test".to_owned(),
            Priority::Normal,
            false,
            || Ok::<_, TaskError>(()),
        );
        task.run_only_once(key, || false);
        task
    }

    #[test]
    fn first_admission_wins_until_removed() {
        clear();
        let winner = keyed_task("dup");
        let loser = keyed_task("dup");
        assert!(try_register("dup", winner.abstract_task()));
        assert!(!try_register("dup", loser.abstract_task()));
        let effective = effective_task("dup").expect("registered");
        assert_eq!(effective.state().id(), winner.id());

        // Removal is identity-checked: the loser cannot evict the winner.
        remove_if_same("dup", loser.id());
        assert!(effective_task("dup").is_some());
        remove_if_same("dup", winner.id());
        assert!(effective_task("dup").is_none());
        clear();
    }
}

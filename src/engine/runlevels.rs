// src/engine/runlevels.rs

//! Bucketing of tasks into ordered execution phases.

use std::collections::BTreeMap;

use crate::engine::Task;

/// Group tasks by runlevel.
///
/// The returned map iterates in ascending runlevel order; inside a bucket
/// tasks keep their construction order.
pub(crate) fn partition(tasks: Vec<Task>) -> BTreeMap<u32, Vec<Task>> {
    let mut buckets: BTreeMap<u32, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        buckets.entry(task.runlevel).or_default().push(task);
    }
    buckets
}

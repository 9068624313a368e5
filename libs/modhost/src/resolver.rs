//! Dependency ordering for module records.

use std::collections::HashSet;

use crate::app::ModuleRecord;
use crate::error::LifecycleError;

/// Order `records` so every module follows all of its dependencies.
///
/// Greedy repeated scan: move the first record whose dependencies are all
/// already placed, then resume scanning from the head of the shortened
/// remainder. Rescanning from the head biases ties toward the input order.
/// When a full scan places nothing, the remainder is unresolvable — a
/// missing dependency, a cycle, or a module depending on itself — and the
/// error names every module still unplaced. Duplicate identifiers are kept
/// as-is.
pub(crate) fn sort_by_dependencies(
    records: Vec<ModuleRecord>,
) -> Result<Vec<ModuleRecord>, LifecycleError> {
    let mut remaining = records;
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut resolved: HashSet<String> = HashSet::new();

    while !remaining.is_empty() {
        let next = remaining.iter().position(|record| {
            record
                .module
                .dependencies()
                .iter()
                .all(|dep| resolved.contains(*dep))
        });
        let Some(idx) = next else {
            return Err(LifecycleError::UnresolvedDependencies {
                modules: remaining.iter().map(|r| r.type_id.clone()).collect(),
            });
        };
        let record = remaining.remove(idx);
        resolved.insert(record.type_id.clone());
        ordered.push(record);
    }

    Ok(ordered)
}

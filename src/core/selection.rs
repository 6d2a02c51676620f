/// Selection queries — related instances, parent sites and disambiguation.
use log::debug;

use crate::core::grammar::{compute_dependencies, find_symbol_paths};
use crate::schema::selection::{
    ConditionSelector, InstanceIndex, InterpretedValue, Selection, SelectionPattern,
    SelectionTarget, ValueMap,
};
use crate::schema::step::{Grammar, Step, StepPath};

/// How an edit at a selection's anchor has to be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorResolution {
    /// Every instance of the anchor is selected.
    Unconditional,
    /// Only some instances are selected; guard the edit with this condition.
    Conditional(Step),
    /// No usable condition was found or the selector declined.
    Skip,
}

/// Paths of every `Symbol` step referencing `name` from a noun that
/// depends on it, in grammar order. References inside `name` itself are
/// not included.
pub fn get_indirect_parents_steps(name: &str, grammar: &Grammar) -> Vec<StepPath> {
    let dependencies = compute_dependencies(grammar);
    let dependents = dependencies.dependents(name);
    find_symbol_paths(grammar, name)
        .into_iter()
        .filter(|path| path.noun != name && dependents.contains(path.noun.as_str()))
        .collect()
}

/// Build one selection per path in `paths`, restricted to the instances
/// related to `indices` by `is_related(selected_index, candidate_index)`.
///
/// Empty `indices` relates every instance. A path with a non-empty
/// `indices` filter and no related instance is left out.
pub fn get_related_selections<T, F>(
    value_map: &ValueMap<T>,
    paths: &[StepPath],
    indices: &[InstanceIndex],
    mut is_related: F,
) -> Vec<Selection<T>>
where
    T: Clone,
    F: FnMut(&InstanceIndex, &InstanceIndex) -> bool,
{
    let mut out = Vec::new();
    for path in paths {
        let related: Vec<&InterpretedValue<T>> = value_map
            .values_at(path)
            .iter()
            .filter(|candidate| {
                indices.is_empty()
                    || indices
                        .iter()
                        .any(|selected| is_related(selected, &candidate.index))
            })
            .collect();
        if !indices.is_empty() && related.is_empty() {
            debug!("no instance of {} relates to the selection", path);
            continue;
        }
        let all_related = related.len() == value_map.values_at(path).len();
        out.push(Selection {
            steps: SelectionTarget::from_path(path.clone()),
            values: related.iter().map(|v| v.value.clone()).collect(),
            indices: if all_related {
                Vec::new()
            } else {
                related.iter().map(|v| v.index.clone()).collect()
            },
        });
    }
    out
}

/// Whether `current` descends from `ancestor` in the instance hierarchy.
pub fn is_instance_prefix(current: &InstanceIndex, ancestor: &InstanceIndex) -> bool {
    current
        .strip_prefix(ancestor.as_str())
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Decide whether the edit applies to all instances or needs a condition,
/// consulting `patterns` and, when several conditions are possible, the
/// `selector`.
///
/// `path` is where the selection's instances were recorded in `value_map`,
/// which is not necessarily where its step lives after earlier edits.
pub fn resolve_anchor<T>(
    value_map: &ValueMap<T>,
    patterns: &[Box<dyn SelectionPattern<T>>],
    selector: &mut dyn ConditionSelector,
    selection: &Selection<T>,
    path: &StepPath,
) -> AnchorResolution {
    if selection.indices.is_empty() {
        return AnchorResolution::Unconditional;
    }
    let (selected, unselected): (Vec<&InterpretedValue<T>>, Vec<&InterpretedValue<T>>) = value_map
        .values_at(path)
        .iter()
        .partition(|value| selection.indices.contains(&value.index));
    if selected.is_empty() {
        debug!("selection on {} matches none of its instances", path);
        return AnchorResolution::Skip;
    }
    if unselected.is_empty() {
        return AnchorResolution::Unconditional;
    }

    let candidates: Vec<Step> = patterns
        .iter()
        .filter(|pattern| pattern.matches(&selected, &unselected))
        .map(|pattern| {
            debug!("pattern '{}' matches selection on {}", pattern.name(), path);
            pattern.condition(&selected)
        })
        .collect();

    match candidates.len() {
        0 => AnchorResolution::Skip,
        1 => candidates
            .into_iter()
            .next()
            .map_or(AnchorResolution::Skip, AnchorResolution::Conditional),
        _ => match selector.select_condition(&candidates) {
            Some(condition) => AnchorResolution::Conditional(condition),
            None => AnchorResolution::Skip,
        },
    }
}

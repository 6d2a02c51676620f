/// Noun-level edits — naming, renaming and garbage collection.
use log::{debug, warn};
use rustc_hash::FxHashSet;

use crate::core::edit::{insert, replace_on_draft, EditContext, InsertPosition};
use crate::core::grammar::{
    compute_dependencies, get_description_of_noun, get_noun_index, traverse_steps,
};
use crate::core::selection::{get_indirect_parents_steps, get_related_selections, is_instance_prefix};
use crate::core::state::EditorState;
use crate::schema::selection::{Selection, SelectionTarget, SelectionsList, ValueMap};
use crate::schema::step::{Grammar, HierarchicalStep, Noun, Step};

/// Drop every noun that is neither a description root nor reachable from
/// one, together with the selections on dropped nouns.
///
/// The first noun of each description group is its root. With
/// `description_names` only the listed groups contribute roots.
pub fn remove_unused_nouns<T: Clone>(
    grammar: &Grammar,
    selections_list: &SelectionsList<T>,
    description_names: Option<&[&str]>,
) -> (Grammar, SelectionsList<T>) {
    let mut found_descriptions = FxHashSet::default();
    let mut stack: Vec<&str> = Vec::new();
    for noun in &grammar.nouns {
        let description = get_description_of_noun(&noun.name);
        let allowed = description_names.map_or(true, |names| names.contains(&description));
        if allowed && found_descriptions.insert(description) {
            stack.push(&noun.name);
        }
    }

    let mut used: FxHashSet<&str> = FxHashSet::default();
    while let Some(name) = stack.pop() {
        if !used.insert(name) {
            continue;
        }
        let Some(noun) = grammar.get(name) else {
            continue;
        };
        traverse_steps(&noun.step, &mut |step| {
            if let Step::Symbol { identifier } = step {
                if !used.contains(identifier.as_str()) {
                    stack.push(identifier);
                }
            }
        });
    }

    let kept = Grammar::new(
        grammar
            .nouns
            .iter()
            .filter(|noun| used.contains(noun.name.as_str()))
            .cloned()
            .collect(),
    );
    if kept.len() != grammar.len() {
        debug!("removed {} unused nouns", grammar.len() - kept.len());
    }
    let selections = selections_list
        .iter()
        .filter(|selection| used.contains(selection.steps.noun_name()))
        .cloned()
        .collect();
    (kept, selections)
}

/// Make sure a noun called `name` exists, reference it after every
/// selection and select the noun itself.
pub fn set_name<T: Clone>(
    ctx: &mut EditContext<'_, T>,
    selections_list: &SelectionsList<T>,
    name: &str,
    grammar: &Grammar,
) -> EditorState<T> {
    let mut grammar = grammar.clone();
    if get_noun_index(name, &grammar).is_none() {
        grammar.nouns.push(Noun::new(name, Step::This));
    }
    let state = insert(
        ctx,
        selections_list,
        InsertPosition::After,
        |_| Step::symbol(name),
        &grammar,
    );
    EditorState {
        selections_list: vec![Selection::noun(name)],
        ..state
    }
}

/// Rename every selected noun to `new_name` and garbage-collect.
///
/// Value map and hover state are reset.
pub fn rename_noun<T: Clone>(
    ctx: &mut EditContext<'_, T>,
    selections_list: &SelectionsList<T>,
    new_name: &str,
    grammar: &Grammar,
) -> EditorState<T> {
    let (draft, selections) = rename_on_draft(ctx, selections_list, new_name, grammar);
    let (grammar, selections_list) = remove_unused_nouns(&draft, &selections, None);
    EditorState {
        dependency_map: compute_dependencies(&grammar),
        grammar,
        selections_list,
        value_map: ValueMap::default(),
        hovered: None,
    }
}

/// The rename itself, before garbage collection.
///
/// For each selection on a whole noun the body is cloned under `new_name`
/// right before the original, and the references from dependent nouns
/// whose instances relate to the selection are rewritten. Selections whose
/// target name is taken or whose source noun is gone are skipped.
pub fn rename_on_draft<T: Clone>(
    ctx: &mut EditContext<'_, T>,
    selections_list: &SelectionsList<T>,
    new_name: &str,
    grammar: &Grammar,
) -> (Grammar, SelectionsList<T>) {
    let mut draft = grammar.clone();
    let mut renamed = Vec::new();

    for selection in selections_list {
        let SelectionTarget::Noun(name) = &selection.steps else {
            continue;
        };
        if get_noun_index(new_name, &draft).is_some() {
            warn!("cannot rename {} to {}: name already taken", name, new_name);
            continue;
        }
        let (Some(existing), Some(existing_on_draft)) =
            (get_noun_index(name, grammar), get_noun_index(name, &draft))
        else {
            warn!("cannot rename {}: noun no longer exists", name);
            continue;
        };

        let mut cloned = grammar.nouns[existing].step.clone();
        rename_symbols(&mut cloned, name, new_name);
        draft
            .nouns
            .insert(existing_on_draft, Noun::new(new_name, cloned));

        let parents = get_indirect_parents_steps(name, &draft);
        if !parents.is_empty() {
            let upward = get_related_selections(ctx.value_map, &parents, &selection.indices, |current, next| {
                is_instance_prefix(current, next)
            });
            debug!(
                "rewriting {} of {} references to {}",
                upward.len(),
                parents.len(),
                name
            );
            replace_on_draft(ctx, upward, |_| Step::symbol(new_name), &mut draft);
        }

        renamed.push(Selection::noun(new_name));
    }

    (draft, renamed)
}

fn rename_symbols(step: &mut Step, from: &str, to: &str) {
    if let Step::Symbol { identifier } = step {
        if identifier == from {
            *identifier = to.to_string();
        }
    }
    if let Some(children) = step.children_mut() {
        for child in children {
            rename_symbols(child, from, to);
        }
    }
}

/// Report every `Symbol` step in `noun` that references `identifier`.
pub fn find_symbols_with_identifier<F>(noun: &Noun, identifier: &str, mut on_found: F)
where
    F: FnMut(&HierarchicalStep<'_>),
{
    for step in noun.hierarchical() {
        if matches!(step.step, Step::Symbol { identifier: id } if id == identifier) {
            on_found(&step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::selection::{IndexPattern, SelectionPattern};
    use crate::schema::step::StepPath;

    fn refuse(_: &[Step]) -> Option<Step> {
        None
    }

    fn ab() -> Grammar {
        Grammar::new(vec![
            Noun::new("A", Step::symbol("B")),
            Noun::new("B", Step::This),
        ])
    }

    #[test]
    fn rename_rewrites_parent_and_collects_old_noun() {
        let map = ValueMap::<()>::new();
        let patterns: Vec<Box<dyn SelectionPattern<()>>> = Vec::new();
        let mut selector = refuse;
        let mut ctx = EditContext::new(&map, &patterns, &mut selector);
        let selections = vec![Selection::noun("B")];

        let (draft, _) = rename_on_draft(&mut ctx, &selections, "C", &ab());
        let names: Vec<&str> = draft.names().collect();
        assert_eq!(names, vec!["A", "C", "B"]);

        let state = rename_noun(&mut ctx, &selections, "C", &ab());
        assert_eq!(
            state.grammar,
            Grammar::new(vec![
                Noun::new("A", Step::symbol("C")),
                Noun::new("C", Step::This),
            ])
        );
        assert_eq!(state.selections_list, vec![Selection::noun("C")]);
        assert!(state.value_map.is_empty());
        assert!(state.hovered.is_none());
    }

    #[test]
    fn rename_skips_taken_names_and_missing_sources() {
        let map = ValueMap::<()>::new();
        let patterns: Vec<Box<dyn SelectionPattern<()>>> = Vec::new();
        let mut selector = refuse;
        let mut ctx = EditContext::new(&map, &patterns, &mut selector);

        let taken = rename_noun(&mut ctx, &vec![Selection::noun("B")], "A", &ab());
        assert_eq!(taken.grammar, ab());
        assert!(taken.selections_list.is_empty());

        let missing = rename_noun(&mut ctx, &vec![Selection::noun("Q")], "Z", &ab());
        assert_eq!(missing.grammar, ab());
    }

    #[test]
    fn rename_updates_recursive_self_references() {
        let grammar = Grammar::new(vec![
            Noun::new("A", Step::symbol("B")),
            Noun::new("B", Step::sequential(vec![Step::This, Step::symbol("B")])),
        ]);
        let map = ValueMap::<()>::new();
        let patterns: Vec<Box<dyn SelectionPattern<()>>> = Vec::new();
        let mut selector = refuse;
        let mut ctx = EditContext::new(&map, &patterns, &mut selector);
        let state = rename_noun(&mut ctx, &vec![Selection::noun("B")], "C", &grammar);
        assert_eq!(
            state.grammar.get("C").unwrap().step,
            Step::sequential(vec![Step::This, Step::symbol("C")])
        );
        assert!(state.grammar.get("B").is_none());
    }

    #[test]
    fn partial_rename_keeps_the_old_noun() {
        let grammar = Grammar::new(vec![
            Noun::new("A", Step::sequential(vec![Step::symbol("B"), Step::symbol("B")])),
            Noun::new("B", Step::This),
        ]);
        let mut map = ValueMap::new();
        map.insert(&StepPath::new("A", vec![0]), "0/0", ());
        map.insert(&StepPath::new("A", vec![1]), "0/1", ());
        let patterns: Vec<Box<dyn SelectionPattern<()>>> = vec![Box::new(IndexPattern)];
        let mut selector = refuse;
        let mut ctx = EditContext::new(&map, &patterns, &mut selector);
        let selection = Selection::noun("B").with_indices(vec!["0/1/0".to_string()]);

        let state = rename_noun(&mut ctx, &vec![selection], "C", &grammar);
        assert_eq!(
            state.grammar.get("A").unwrap().step,
            Step::sequential(vec![Step::symbol("B"), Step::symbol("C")])
        );
        assert!(state.grammar.get("B").is_some());
        assert!(state.grammar.get("C").is_some());
    }

    #[test]
    fn set_name_creates_and_selects_noun() {
        let map = ValueMap::<()>::new();
        let patterns: Vec<Box<dyn SelectionPattern<()>>> = Vec::new();
        let mut selector = refuse;
        let mut ctx = EditContext::new(&map, &patterns, &mut selector);
        let state = set_name(&mut ctx, &vec![Selection::noun("B")], "Roof", &ab());

        assert_eq!(get_noun_index("Roof", &state.grammar), Some(2));
        assert_eq!(
            state.grammar.get("B").unwrap().step,
            Step::sequential(vec![Step::This, Step::symbol("Roof")])
        );
        assert_eq!(state.selections_list, vec![Selection::noun("Roof")]);
        assert!(state.dependency_map.depends_on("A", "Roof"));
    }

    #[test]
    fn gc_keeps_description_roots() {
        let grammar = Grammar::new(vec![
            Noun::new("A", Step::This),
            Noun::new("Start@Tower", Step::symbol("Roof@Tower")),
            Noun::new("Roof@Tower", Step::This),
            Noun::new("Orphan@Tower", Step::This),
            Noun::new("Lonely", Step::This),
        ]);
        let selections = vec![Selection::<()>::noun("Orphan@Tower"), Selection::noun("A")];
        let (kept, selections) = remove_unused_nouns(&grammar, &selections, None);
        let names: Vec<&str> = kept.names().collect();
        assert_eq!(names, vec!["A", "Start@Tower", "Roof@Tower"]);
        assert_eq!(selections, vec![Selection::noun("A")]);

        let (only_tower, _) = remove_unused_nouns::<()>(&grammar, &Vec::new(), Some(&["Tower"][..]));
        let names: Vec<&str> = only_tower.names().collect();
        assert_eq!(names, vec!["Start@Tower", "Roof@Tower"]);
    }

    #[test]
    fn find_symbols_reports_paths() {
        let noun = Noun::new(
            "A",
            Step::sequential(vec![Step::symbol("B"), Step::This, Step::symbol("B")]),
        );
        let mut found = Vec::new();
        find_symbols_with_identifier(&noun, "B", |step| found.push(step.path.clone()));
        assert_eq!(
            found,
            vec![StepPath::new("A", vec![0]), StepPath::new("A", vec![2])]
        );
    }
}

/// Structural edits anchored on selections — insert and replace.
///
/// Every batch edit runs on an `EditDraft`: a private copy of the grammar
/// and selections. Selections are processed in list order, each one sees
/// the draft left by the previous edits, and the draft is committed into a
/// fresh `EditorState` at the end.
use log::{debug, warn};

use crate::core::grammar::{compute_dependencies, dedupe_nouns};
use crate::core::selection::{resolve_anchor, AnchorResolution};
use crate::core::state::EditorState;
use crate::schema::selection::{
    ConditionSelector, Selection, SelectionPattern, SelectionTarget, SelectionsList, ValueMap,
};
use crate::schema::step::{Grammar, Step, StepPath};

/// Collaborators supplied with every edit call.
pub struct EditContext<'a, T> {
    pub value_map: &'a ValueMap<T>,
    pub patterns: &'a [Box<dyn SelectionPattern<T>>],
    pub selector: &'a mut dyn ConditionSelector,
}

impl<'a, T> EditContext<'a, T> {
    pub fn new(
        value_map: &'a ValueMap<T>,
        patterns: &'a [Box<dyn SelectionPattern<T>>],
        selector: &'a mut dyn ConditionSelector,
    ) -> Self {
        Self {
            value_map,
            patterns,
            selector,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
}

/// How the paths of other selections move after one edit.
#[derive(Debug, Clone)]
enum PathRemap {
    Keep,
    /// Children of `parent` from index `from` on moved one slot right.
    Shift { parent: StepPath, from: usize },
    /// The step at `at` now lives at `at/offset`.
    Wrap { at: StepPath, offset: usize },
    /// The step at `at` was replaced; deeper paths survive only where the
    /// new tree still holds the same step.
    Replace { at: StepPath, old: Step },
}

impl PathRemap {
    fn apply(&self, path: &StepPath, grammar: &Grammar) -> Option<StepPath> {
        match self {
            Self::Keep => Some(path.clone()),
            Self::Shift { parent, from } => {
                let depth = parent.indices.len();
                let mut moved = path.clone();
                if path.indices.len() > depth && path.starts_with(parent) && path.indices[depth] >= *from {
                    moved.indices[depth] += 1;
                }
                Some(moved)
            }
            Self::Wrap { at, offset } => {
                if !path.starts_with(at) {
                    return Some(path.clone());
                }
                let mut indices = at.indices.clone();
                indices.push(*offset);
                indices.extend_from_slice(&path.indices[at.indices.len()..]);
                Some(StepPath::new(path.noun.clone(), indices))
            }
            Self::Replace { at, old } => {
                if !path.starts_with(at) || path == at {
                    return Some(path.clone());
                }
                let relative = &path.indices[at.indices.len()..];
                let before = old.get(relative);
                let after = grammar.step_at(at).and_then(|step| step.get(relative));
                match (before, after) {
                    (Some(b), Some(a)) if a == b => Some(path.clone()),
                    _ => None,
                }
            }
        }
    }
}

/// Copy-on-write scratch state for one batch edit.
#[derive(Debug, Clone)]
pub struct EditDraft<T> {
    grammar: Grammar,
    selections: Vec<Option<Selection<T>>>,
    /// Path each selection had when the draft was opened; instance values
    /// in the value map stay keyed by it.
    origins: Vec<StepPath>,
}

impl<T: Clone> EditDraft<T> {
    pub fn new(grammar: &Grammar, selections_list: &SelectionsList<T>) -> Self {
        Self::from_parts(grammar.clone(), selections_list.clone())
    }

    pub fn from_parts(grammar: Grammar, selections_list: SelectionsList<T>) -> Self {
        let origins = selections_list
            .iter()
            .map(|selection| selection.steps.path())
            .collect();
        Self {
            grammar,
            selections: selections_list.into_iter().map(Some).collect(),
            origins,
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Insert a step produced by `factory` next to every selection's anchor.
    pub fn insert_all<F>(&mut self, ctx: &mut EditContext<'_, T>, position: InsertPosition, mut factory: F)
    where
        F: FnMut(&Step) -> Step,
    {
        self.edit_all(ctx, |grammar, at, condition| {
            let anchor = grammar.step_at(at)?;
            let mut created = factory(anchor);
            if let Some(condition) = condition {
                created = Step::If {
                    children: vec![condition, created, Step::This],
                };
            }
            insert_at(grammar, at, position, created)
        });
    }

    /// Replace every selection's anchor with the result of `factory`.
    pub fn replace_all<F>(&mut self, ctx: &mut EditContext<'_, T>, mut factory: F)
    where
        F: FnMut(&Step) -> Step,
    {
        self.edit_all(ctx, |grammar, at, condition| {
            let anchor = grammar.step_at_mut(at)?;
            let replacement = factory(anchor);
            let old = std::mem::replace(anchor, Step::This);
            Some(match condition {
                None => {
                    *anchor = replacement;
                    (
                        PathRemap::Replace {
                            at: at.clone(),
                            old,
                        },
                        at.clone(),
                    )
                }
                Some(condition) => {
                    *anchor = Step::If {
                        children: vec![condition, replacement, old],
                    };
                    (
                        PathRemap::Wrap {
                            at: at.clone(),
                            offset: 2,
                        },
                        at.child(1),
                    )
                }
            })
        });
    }

    fn edit_all<E>(&mut self, ctx: &mut EditContext<'_, T>, mut edit: E)
    where
        E: FnMut(&mut Grammar, &StepPath, Option<Step>) -> Option<(PathRemap, StepPath)>,
    {
        for i in 0..self.selections.len() {
            let Some(selection) = self.selections[i].clone() else {
                continue;
            };
            let at = selection.steps.path();
            if self.grammar.step_at(&at).is_none() {
                warn!("dropping selection on missing step {}", at);
                self.selections[i] = None;
                continue;
            }

            let condition = match resolve_anchor(
                ctx.value_map,
                ctx.patterns,
                &mut *ctx.selector,
                &selection,
                &self.origins[i],
            ) {
                AnchorResolution::Unconditional => None,
                AnchorResolution::Conditional(condition) => Some(condition),
                AnchorResolution::Skip => {
                    warn!("skipping edit at {}: no condition resolved", at);
                    continue;
                }
            };

            let Some((remap, edited)) = edit(&mut self.grammar, &at, condition) else {
                warn!("edit at {} could not be applied", at);
                continue;
            };
            debug!("edited {} (now {})", at, edited);

            for (j, slot) in self.selections.iter_mut().enumerate() {
                if j == i {
                    continue;
                }
                if let Some(other) = slot {
                    match remap.apply(&other.steps.path(), &self.grammar) {
                        Some(path) => other.steps = SelectionTarget::from_path(path),
                        None => {
                            debug!("dropping selection on discarded step {}", other.steps.path());
                            *slot = None;
                        }
                    }
                }
            }
            if let Some(current) = &mut self.selections[i] {
                current.steps = SelectionTarget::from_path(edited);
            }
        }
    }

    pub fn into_parts(self) -> (Grammar, SelectionsList<T>) {
        (self.grammar, self.selections.into_iter().flatten().collect())
    }

    /// Deduplicate noun names and freeze the draft into a snapshot.
    pub fn commit(self, value_map: ValueMap<T>, hovered: Option<Selection<T>>) -> EditorState<T> {
        let (mut grammar, selections_list) = self.into_parts();
        dedupe_nouns(&mut grammar.nouns);
        EditorState {
            dependency_map: compute_dependencies(&grammar),
            grammar,
            selections_list,
            value_map,
            hovered,
        }
    }
}

fn insert_at(
    grammar: &mut Grammar,
    at: &StepPath,
    position: InsertPosition,
    created: Step,
) -> Option<(PathRemap, StepPath)> {
    if let Step::Sequential { children } = grammar.step_at_mut(at)? {
        return Some(match position {
            InsertPosition::After => {
                children.push(created);
                (PathRemap::Keep, at.child(children.len() - 1))
            }
            InsertPosition::Before => {
                children.insert(0, created);
                (
                    PathRemap::Shift {
                        parent: at.clone(),
                        from: 0,
                    },
                    at.child(0),
                )
            }
        });
    }

    if let (Some(parent), Some(&index)) = (at.parent(), at.indices.last()) {
        if let Some(Step::Sequential { children }) = grammar.step_at_mut(&parent) {
            let slot = match position {
                InsertPosition::After => index + 1,
                InsertPosition::Before => index,
            };
            children.insert(slot, created);
            return Some((
                PathRemap::Shift {
                    parent: parent.clone(),
                    from: slot,
                },
                parent.child(slot),
            ));
        }
    }

    let anchor = grammar.step_at_mut(at)?;
    let old = std::mem::replace(anchor, Step::This);
    let (children, offset, created_index) = match position {
        InsertPosition::After => (vec![old, created], 0, 1),
        InsertPosition::Before => (vec![created, old], 1, 0),
    };
    *anchor = Step::Sequential { children };
    Some((
        PathRemap::Wrap {
            at: at.clone(),
            offset,
        },
        at.child(created_index),
    ))
}

/// Insert `factory`'s step before or after every selection.
pub fn insert<T, F>(
    ctx: &mut EditContext<'_, T>,
    selections_list: &SelectionsList<T>,
    position: InsertPosition,
    factory: F,
    grammar: &Grammar,
) -> EditorState<T>
where
    T: Clone,
    F: FnMut(&Step) -> Step,
{
    let mut draft = EditDraft::new(grammar, selections_list);
    draft.insert_all(ctx, position, factory);
    draft.commit(ctx.value_map.clone(), None)
}

/// Replace every selected step with `factory`'s result.
pub fn replace<T, F>(
    ctx: &mut EditContext<'_, T>,
    selections_list: &SelectionsList<T>,
    factory: F,
    grammar: &Grammar,
) -> EditorState<T>
where
    T: Clone,
    F: FnMut(&Step) -> Step,
{
    let mut draft = EditDraft::new(grammar, selections_list);
    draft.replace_all(ctx, factory);
    draft.commit(ctx.value_map.clone(), None)
}

/// `replace` against a grammar that is itself a draft of a larger edit.
/// Returns the edited selections.
pub fn replace_on_draft<T, F>(
    ctx: &mut EditContext<'_, T>,
    selections_list: SelectionsList<T>,
    factory: F,
    grammar: &mut Grammar,
) -> SelectionsList<T>
where
    T: Clone,
    F: FnMut(&Step) -> Step,
{
    let mut draft = EditDraft::from_parts(std::mem::take(grammar), selections_list);
    draft.replace_all(ctx, factory);
    let (edited, selections) = draft.into_parts();
    *grammar = edited;
    selections
}

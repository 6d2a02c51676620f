/// Editor state snapshots and the committed-state store.
use log::debug;
use rustc_hash::FxHashSet;

use crate::core::grammar::{compute_dependencies, dedupe_nouns, get_noun_index, DependencyMap};
use crate::schema::selection::{Selection, SelectionsList, ValueMap};
use crate::schema::step::Grammar;

/// The snapshot handed back after every edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState<T> {
    pub grammar: Grammar,
    pub selections_list: SelectionsList<T>,
    pub value_map: ValueMap<T>,
    pub dependency_map: DependencyMap,
    pub hovered: Option<Selection<T>>,
}

impl<T> EditorState<T> {
    pub fn new(grammar: Grammar) -> Self {
        let dependency_map = compute_dependencies(&grammar);
        Self {
            grammar,
            selections_list: Vec::new(),
            value_map: ValueMap::default(),
            dependency_map,
            hovered: None,
        }
    }
}

/// A committed state together with the version it was taken at.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub version: u64,
    pub state: EditorState<T>,
}

/// Holds the latest committed editor state.
///
/// Edits run against a `Snapshot` and come back through `commit`. A commit
/// whose base is stale is rebased noun by noun onto the latest grammar; for
/// nouns touched on both sides the later commit wins.
#[derive(Debug)]
pub struct EditorStore<T> {
    state: EditorState<T>,
    version: u64,
}

impl<T: Clone> EditorStore<T> {
    pub fn new(state: EditorState<T>) -> Self {
        Self { state, version: 0 }
    }

    pub fn state(&self) -> &EditorState<T> {
        &self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        Snapshot {
            version: self.version,
            state: self.state.clone(),
        }
    }

    /// Commit `result`, computed from `base`. Returns the new version.
    pub fn commit(&mut self, base: &Snapshot<T>, result: EditorState<T>) -> u64 {
        if base.version == self.version {
            self.state = result;
        } else {
            debug!(
                "rebasing edit from version {} onto version {}",
                base.version, self.version
            );
            let grammar = rebase_grammar(&base.state.grammar, &result.grammar, &self.state.grammar);
            let selections_list = result
                .selections_list
                .into_iter()
                .filter(|selection| get_noun_index(selection.steps.noun_name(), &grammar).is_some())
                .collect();
            self.state = EditorState {
                dependency_map: compute_dependencies(&grammar),
                grammar,
                selections_list,
                value_map: result.value_map,
                hovered: result.hovered,
            };
        }
        self.version += 1;
        self.version
    }
}

/// Apply the noun-level difference between `base` and `edited` onto `latest`.
fn rebase_grammar(base: &Grammar, edited: &Grammar, latest: &Grammar) -> Grammar {
    let edited_names: FxHashSet<&str> = edited.names().collect();
    let removed: FxHashSet<&str> = base
        .names()
        .filter(|name| !edited_names.contains(name))
        .collect();

    let mut nouns: Vec<_> = latest
        .nouns
        .iter()
        .filter(|noun| !removed.contains(noun.name.as_str()))
        .cloned()
        .collect();

    for (position, noun) in edited.nouns.iter().enumerate() {
        if base.get(&noun.name) == Some(noun) {
            continue;
        }
        if let Some(existing) = nouns.iter_mut().find(|n| n.name == noun.name) {
            *existing = noun.clone();
            continue;
        }
        let anchor = edited.nouns[position + 1..]
            .iter()
            .find_map(|next| nouns.iter().position(|n| n.name == next.name));
        match anchor {
            Some(index) => nouns.insert(index, noun.clone()),
            None => nouns.push(noun.clone()),
        }
    }

    dedupe_nouns(&mut nouns);
    Grammar::new(nouns)
}

/// Grammar utilities — noun lookup, traversal, dependencies, loading.
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use thiserror::Error;

use crate::schema::step::{Grammar, Noun, Step, StepPath};

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("noun not found: {0}")]
    NounNotFound(String),
    #[error("no step at path {0}")]
    InvalidPath(StepPath),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Separator between a noun's local name and its description group.
pub const DESCRIPTION_SEPARATOR: char = '@';

/// Index of the first noun called `name`.
pub fn get_noun_index(name: &str, grammar: &Grammar) -> Option<usize> {
    grammar.nouns.iter().position(|noun| noun.name == name)
}

/// Description group of a noun: the part after the last `@`, or `""` for
/// names without one (`"Roof@Tower"` belongs to `"Tower"`).
pub fn get_description_of_noun(name: &str) -> &str {
    match name.rfind(DESCRIPTION_SEPARATOR) {
        Some(pos) => &name[pos + DESCRIPTION_SEPARATOR.len_utf8()..],
        None => "",
    }
}

/// Depth-first pre-order visit of every step in `root`.
///
/// Does not follow `Symbol` steps into the nouns they reference.
pub fn traverse_steps<'a, F>(root: &'a Step, visitor: &mut F)
where
    F: FnMut(&'a Step),
{
    visitor(root);
    if let Some(children) = root.children() {
        for child in children {
            traverse_steps(child, visitor);
        }
    }
}

/// Direct `Symbol` edges between nouns, excluding self references.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DependencyMap {
    edges: FxHashMap<String, FxHashSet<String>>,
}

impl DependencyMap {
    /// Nouns referenced directly from `name`'s body.
    pub fn direct(&self, name: &str) -> Option<&FxHashSet<String>> {
        self.edges.get(name)
    }

    /// Every noun reachable from `name` through symbol references.
    pub fn transitive(&self, name: &str) -> FxHashSet<String> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<&str> = vec![name];
        while let Some(current) = stack.pop() {
            if let Some(deps) = self.edges.get(current) {
                for dep in deps {
                    if seen.insert(dep.clone()) {
                        stack.push(dep);
                    }
                }
            }
        }
        seen
    }

    /// True when `name` reaches `target`, directly or indirectly.
    pub fn depends_on(&self, name: &str, target: &str) -> bool {
        self.transitive(name).contains(target)
    }

    /// Nouns whose bodies reference `name` directly.
    pub fn dependents(&self, name: &str) -> FxHashSet<&str> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(noun, _)| noun.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

pub fn compute_dependencies(grammar: &Grammar) -> DependencyMap {
    let mut edges = FxHashMap::default();
    for noun in &grammar.nouns {
        let deps: &mut FxHashSet<String> = edges.entry(noun.name.clone()).or_default();
        traverse_steps(&noun.step, &mut |step| {
            if let Step::Symbol { identifier } = step {
                if *identifier != noun.name {
                    deps.insert(identifier.clone());
                }
            }
        });
    }
    DependencyMap { edges }
}

/// Every `Symbol` step in `grammar` referencing `identifier`, with its path.
pub fn find_symbol_paths(grammar: &Grammar, identifier: &str) -> Vec<StepPath> {
    let mut out = Vec::new();
    for noun in &grammar.nouns {
        for hierarchical in noun.hierarchical() {
            if matches!(hierarchical.step, Step::Symbol { identifier: id } if id == identifier) {
                out.push(hierarchical.path);
            }
        }
    }
    out
}

/// Keep the first noun of every name.
pub fn dedupe_nouns(nouns: &mut Vec<Noun>) {
    let mut seen = FxHashSet::default();
    nouns.retain(|noun| seen.insert(noun.name.clone()));
}

impl Grammar {
    /// Load a grammar from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Grammar, GrammarError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a grammar from a RON string. Duplicate names keep the first.
    pub fn parse_ron(input: &str) -> Result<Grammar, GrammarError> {
        let mut grammar: Grammar = ron::from_str(input)?;
        dedupe_nouns(&mut grammar.nouns);
        Ok(grammar)
    }

    pub fn try_step_at(&self, path: &StepPath) -> Result<&Step, GrammarError> {
        if get_noun_index(&path.noun, self).is_none() {
            return Err(GrammarError::NounNotFound(path.noun.clone()));
        }
        self.step_at(path)
            .ok_or_else(|| GrammarError::InvalidPath(path.clone()))
    }
}

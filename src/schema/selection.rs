use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::step::{Operator, Step, StepPath, Value};

/// Hierarchical instance index produced by the interpreter, e.g. `"0/2/1"`.
///
/// An instance created inside another instance carries the outer index as
/// a prefix.
pub type InstanceIndex = String;

/// What a selection points at: a whole noun or a step inside one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionTarget {
    Noun(String),
    Path(StepPath),
}

impl SelectionTarget {
    pub fn path(&self) -> StepPath {
        match self {
            Self::Noun(name) => StepPath::root(name.clone()),
            Self::Path(path) => path.clone(),
        }
    }

    pub fn noun_name(&self) -> &str {
        match self {
            Self::Noun(name) => name,
            Self::Path(path) => &path.noun,
        }
    }

    /// Normalises root paths to `Noun`.
    pub fn from_path(path: StepPath) -> Self {
        if path.indices.is_empty() {
            Self::Noun(path.noun)
        } else {
            Self::Path(path)
        }
    }
}

/// A concrete edit site plus the instances it applies to.
///
/// Empty `indices` means every instance of the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection<T> {
    pub steps: SelectionTarget,
    pub values: Vec<T>,
    pub indices: Vec<InstanceIndex>,
}

impl<T> Selection<T> {
    pub fn noun(name: impl Into<String>) -> Self {
        Self {
            steps: SelectionTarget::Noun(name.into()),
            values: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn path(path: StepPath) -> Self {
        Self {
            steps: SelectionTarget::from_path(path),
            values: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn with_indices(mut self, indices: Vec<InstanceIndex>) -> Self {
        self.indices = indices;
        self
    }
}

pub type SelectionsList<T> = Vec<Selection<T>>;

/// One value the interpreter produced for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretedValue<T> {
    pub index: InstanceIndex,
    pub value: T,
}

/// Interpreted values keyed by `StepPath::key()`. Read-only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMap<T> {
    entries: FxHashMap<String, Vec<InterpretedValue<T>>>,
}

impl<T> Default for ValueMap<T> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<T> ValueMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &StepPath, index: impl Into<InstanceIndex>, value: T) {
        self.entries
            .entry(path.key())
            .or_default()
            .push(InterpretedValue {
                index: index.into(),
                value,
            });
    }

    pub fn values_at(&self, path: &StepPath) -> &[InterpretedValue<T>] {
        self.entries
            .get(&path.key())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Recognises a partial selection and produces a condition step that
/// separates the selected instances from the rest.
pub trait SelectionPattern<T> {
    fn name(&self) -> &str;

    fn matches(&self, selected: &[&InterpretedValue<T>], unselected: &[&InterpretedValue<T>]) -> bool;

    fn condition(&self, selected: &[&InterpretedValue<T>]) -> Step;
}

/// Matches any partial selection and restricts the edit by instance index.
#[derive(Debug, Clone, Default)]
pub struct IndexPattern;

impl<T> SelectionPattern<T> for IndexPattern {
    fn name(&self) -> &str {
        "index"
    }

    fn matches(&self, selected: &[&InterpretedValue<T>], _unselected: &[&InterpretedValue<T>]) -> bool {
        !selected.is_empty()
    }

    fn condition(&self, selected: &[&InterpretedValue<T>]) -> Step {
        let comparisons = selected.iter().map(|value| Step::Operator {
            operator: Operator::Equal,
            children: vec![
                Step::get_variable("index"),
                Step::Raw(Value::String(value.index.clone())),
            ],
        });
        comparisons
            .reduce(|left, right| Step::Operator {
                operator: Operator::Or,
                children: vec![left, right],
            })
            .unwrap_or(Step::Raw(Value::Bool(false)))
    }
}

/// Resolves an ambiguous edit site by picking one candidate condition.
///
/// Returning `None` skips the edit for that selection only.
pub trait ConditionSelector {
    fn select_condition(&mut self, candidates: &[Step]) -> Option<Step>;
}

impl<F> ConditionSelector for F
where
    F: FnMut(&[Step]) -> Option<Step>,
{
    fn select_condition(&mut self, candidates: &[Step]) -> Option<Step> {
        self(candidates)
    }
}

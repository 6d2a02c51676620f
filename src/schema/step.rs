/// Grammar data model: steps, nouns, grammars and step paths.
use serde::{Deserialize, Serialize};
use std::fmt;

/// A literal payload carried by `Step::Raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
}

/// Unary and binary operators of `Step::Operator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Not,
    Invert,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Equal,
    Unequal,
    Smaller,
    SmallerEqual,
    Greater,
    GreaterEqual,
}

/// One node of a rule body.
///
/// Cases without a `children` field never have children; `children()`
/// reports them as `None`, which is distinct from an empty child list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    This,
    Null,
    Return,
    Raw(Value),
    /// Reference to another noun by name. The only rule-to-rule edge.
    Symbol { identifier: String },
    GetVariable { identifier: String },
    SetVariable { identifier: String, children: Vec<Step> },
    Operation { identifier: String, children: Vec<Step> },
    Operator { operator: Operator, children: Vec<Step> },
    Sequential { children: Vec<Step> },
    Parallel { children: Vec<Step> },
    Bracket { children: Vec<Step> },
    /// Picks one child, weighted by `probabilities` (one entry per child).
    Random { probabilities: Vec<f64>, children: Vec<Step> },
    /// `[condition, then, else]`.
    If { children: Vec<Step> },
    /// `[value, case_0, case_1, ...]`, matched against `cases`.
    Switch { cases: Vec<Value>, children: Vec<Step> },
}

impl Step {
    pub fn symbol(identifier: impl Into<String>) -> Self {
        Self::Symbol {
            identifier: identifier.into(),
        }
    }

    pub fn get_variable(identifier: impl Into<String>) -> Self {
        Self::GetVariable {
            identifier: identifier.into(),
        }
    }

    pub fn operation(identifier: impl Into<String>, children: Vec<Step>) -> Self {
        Self::Operation {
            identifier: identifier.into(),
            children,
        }
    }

    pub fn sequential(children: Vec<Step>) -> Self {
        Self::Sequential { children }
    }

    pub fn raw_number(n: f64) -> Self {
        Self::Raw(Value::Number(n))
    }

    /// Short lowercase discriminant name, e.g. `"symbol"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::This => "this",
            Self::Null => "null",
            Self::Return => "return",
            Self::Raw(_) => "raw",
            Self::Symbol { .. } => "symbol",
            Self::GetVariable { .. } => "getVariable",
            Self::SetVariable { .. } => "setVariable",
            Self::Operation { .. } => "operation",
            Self::Operator { .. } => "operator",
            Self::Sequential { .. } => "sequential",
            Self::Parallel { .. } => "parallel",
            Self::Bracket { .. } => "bracket",
            Self::Random { .. } => "random",
            Self::If { .. } => "if",
            Self::Switch { .. } => "switch",
        }
    }

    pub fn children(&self) -> Option<&[Step]> {
        match self {
            Self::This
            | Self::Null
            | Self::Return
            | Self::Raw(_)
            | Self::Symbol { .. }
            | Self::GetVariable { .. } => None,
            Self::SetVariable { children, .. }
            | Self::Operation { children, .. }
            | Self::Operator { children, .. }
            | Self::Sequential { children }
            | Self::Parallel { children }
            | Self::Bracket { children }
            | Self::Random { children, .. }
            | Self::If { children }
            | Self::Switch { children, .. } => Some(children),
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Step>> {
        match self {
            Self::This
            | Self::Null
            | Self::Return
            | Self::Raw(_)
            | Self::Symbol { .. }
            | Self::GetVariable { .. } => None,
            Self::SetVariable { children, .. }
            | Self::Operation { children, .. }
            | Self::Operator { children, .. }
            | Self::Sequential { children }
            | Self::Parallel { children }
            | Self::Bracket { children }
            | Self::Random { children, .. }
            | Self::If { children }
            | Self::Switch { children, .. } => Some(children),
        }
    }

    /// Step at `indices` below this one.
    pub fn get(&self, indices: &[usize]) -> Option<&Step> {
        let mut current = self;
        for &i in indices {
            current = current.children()?.get(i)?;
        }
        Some(current)
    }

    pub fn get_mut(&mut self, indices: &[usize]) -> Option<&mut Step> {
        let mut current = self;
        for &i in indices {
            current = current.children_mut()?.get_mut(i)?;
        }
        Some(current)
    }

    /// Flatten sequentials nested directly in sequentials and collapse
    /// single-child sequentials.
    pub fn normalize(self) -> Step {
        match self {
            Step::Sequential { children } => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children {
                    match child.normalize() {
                        Step::Sequential { children } => flat.extend(children),
                        other => flat.push(other),
                    }
                }
                if flat.len() == 1 {
                    flat.pop().unwrap_or(Step::This)
                } else {
                    Step::Sequential { children: flat }
                }
            }
            mut other => {
                if let Some(children) = other.children_mut() {
                    let taken = std::mem::take(children);
                    *children = taken.into_iter().map(Step::normalize).collect();
                }
                other
            }
        }
    }
}

/// A named production rule. Owns its step tree exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Noun {
    pub name: String,
    pub step: Step,
}

impl Noun {
    pub fn new(name: impl Into<String>, step: Step) -> Self {
        Self {
            name: name.into(),
            step,
        }
    }

    /// Every step of the body with its derived path, in pre-order.
    pub fn hierarchical(&self) -> Vec<HierarchicalStep<'_>> {
        let mut out = Vec::new();
        let mut indices = Vec::new();
        collect_hierarchical(&self.name, &self.step, &mut indices, &mut out);
        out
    }
}

fn collect_hierarchical<'a>(
    noun: &str,
    step: &'a Step,
    indices: &mut Vec<usize>,
    out: &mut Vec<HierarchicalStep<'a>>,
) {
    out.push(HierarchicalStep {
        step,
        path: StepPath::new(noun, indices.clone()),
    });
    if let Some(children) = step.children() {
        for (i, child) in children.iter().enumerate() {
            indices.push(i);
            collect_hierarchical(noun, child, indices, out);
            indices.pop();
        }
    }
}

/// An ordered set of nouns. Order is insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Grammar {
    pub nouns: Vec<Noun>,
}

impl Grammar {
    pub fn new(nouns: Vec<Noun>) -> Self {
        Self { nouns }
    }

    pub fn len(&self) -> usize {
        self.nouns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nouns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nouns.iter().map(|noun| noun.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Noun> {
        self.nouns.iter().find(|noun| noun.name == name)
    }

    pub fn step_at(&self, path: &StepPath) -> Option<&Step> {
        self.get(&path.noun)?.step.get(&path.indices)
    }

    pub fn step_at_mut(&mut self, path: &StepPath) -> Option<&mut Step> {
        self.nouns
            .iter_mut()
            .find(|noun| noun.name == path.noun)?
            .step
            .get_mut(&path.indices)
    }
}

/// Location of a step: owning noun plus child indices from its root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepPath {
    pub noun: String,
    pub indices: Vec<usize>,
}

impl StepPath {
    pub fn new(noun: impl Into<String>, indices: Vec<usize>) -> Self {
        Self {
            noun: noun.into(),
            indices,
        }
    }

    pub fn root(noun: impl Into<String>) -> Self {
        Self::new(noun, Vec::new())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.indices.clone();
        indices.push(index);
        Self::new(self.noun.clone(), indices)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.indices.split_last()?;
        Some(Self::new(self.noun.clone(), rest.to_vec()))
    }

    /// True when `self` lies at or below `other`.
    pub fn starts_with(&self, other: &StepPath) -> bool {
        self.noun == other.noun && self.indices.starts_with(&other.indices)
    }

    /// Key used by value maps, e.g. `"Building/0/2"`.
    pub fn key(&self) -> String {
        let mut key = self.noun.clone();
        for i in &self.indices {
            key.push('/');
            key.push_str(&i.to_string());
        }
        key
    }
}

impl fmt::Display for StepPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A borrowed step together with its location. Derived, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchicalStep<'a> {
    pub step: &'a Step,
    pub path: StepPath,
}

/// Flattened token form of a rule body, produced per execution branch.
use serde::{Deserialize, Serialize};

use super::step::{Operator, Step, Value};

/// One entry per parallel branch.
pub type Vertical<T> = Vec<Weighted<T>>;

/// One branch's ordered token stream.
pub type Horizontal<T> = Vec<T>;

/// A value tagged with the likelihood of the branch it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weighted<T> {
    pub value: T,
    pub probability: f64,
}

impl<T> Weighted<T> {
    pub fn new(value: T, probability: f64) -> Self {
        Self { value, probability }
    }
}

/// The filter step a `FilterStart` marker was produced from, minus the
/// chosen child (which follows the marker as tokens).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterHeader {
    Random { probabilities: Vec<f64> },
    If { condition: Step },
    Switch { value: Step, cases: Vec<Value> },
}

impl FilterHeader {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Random { .. } => "random",
            Self::If { .. } => "if",
            Self::Switch { .. } => "switch",
        }
    }
}

/// A flattened token. `NounStart/NounEnd` and `FilterStart/FilterEnd`
/// exist only in this form and mark scope entry and exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LinearizedStep {
    NounStart { identifier: String },
    NounEnd { identifier: String },
    FilterStart {
        header: FilterHeader,
        chosen: usize,
        /// Every alternative of the filter; the chosen one is left as `This`.
        alternatives: Vec<Step>,
    },
    FilterEnd,
    This,
    Null,
    Return,
    Raw(Value),
    /// A reference that was not expanded into a noun scope.
    Symbol { identifier: String },
    GetVariable { identifier: String },
    SetVariable { identifier: String, children: Vec<LinearizationResult> },
    Operation { identifier: String, children: Vec<LinearizationResult> },
    Operator { operator: Operator, children: Vec<LinearizationResult> },
    Parallel { children: Vec<LinearizationResult> },
    Bracket { children: Vec<LinearizationResult> },
}

impl LinearizedStep {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NounStart { .. } => "nounStart",
            Self::NounEnd { .. } => "nounEnd",
            Self::FilterStart { .. } => "filterStart",
            Self::FilterEnd => "filterEnd",
            Self::This => "this",
            Self::Null => "null",
            Self::Return => "return",
            Self::Raw(_) => "raw",
            Self::Symbol { .. } => "symbol",
            Self::GetVariable { .. } => "getVariable",
            Self::SetVariable { .. } => "setVariable",
            Self::Operation { .. } => "operation",
            Self::Operator { .. } => "operator",
            Self::Parallel { .. } => "parallel",
            Self::Bracket { .. } => "bracket",
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            Self::NounStart { .. } | Self::NounEnd { .. } | Self::FilterStart { .. } | Self::FilterEnd
        )
    }

    pub fn children(&self) -> Option<&[LinearizationResult]> {
        match self {
            Self::SetVariable { children, .. }
            | Self::Operation { children, .. }
            | Self::Operator { children, .. }
            | Self::Parallel { children }
            | Self::Bracket { children } => Some(children),
            _ => None,
        }
    }
}

/// Aligned-but-not-yet-combined rows.
///
/// `separation_matrix[i][j]` is the number of leading top-level units rows
/// `i` and `j` share before their structure diverges. The diagonal holds a
/// row's own unit count.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinearizationResult {
    pub vertical: Vertical<Horizontal<LinearizedStep>>,
    pub separation_matrix: Vec<Vec<usize>>,
}

impl LinearizationResult {
    pub fn rows(&self) -> usize {
        self.vertical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertical.is_empty()
    }

    /// Scale every row's probability.
    pub fn with_probability(mut self, probability: f64) -> Self {
        for row in &mut self.vertical {
            row.probability *= probability;
        }
        self
    }
}

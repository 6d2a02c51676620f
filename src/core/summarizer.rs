/// Summarizer — folds many execution branches of a rule body into one step.
///
/// Branches are linearized, merged into a single `LinearizationResult`,
/// aligned into nest groups and rebuilt group by group. Positions where the
/// branches diverge come back as `Random` steps weighted by how likely each
/// side was.
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::combine::combine;
use crate::core::group::{group, NestGroup};
use crate::core::linearize::{ExecutionBranch, Linearizer};
use crate::schema::linearized::{FilterHeader, LinearizationResult};
use crate::schema::step::{Grammar, Noun, Step};

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("cannot combine a boundary token directly: {0}")]
    BoundaryToken(&'static str),
    #[error("unbalanced scope marker at token {0}")]
    UnbalancedScope(usize),
    #[error("execution branch has no choice left for a {0} step")]
    MissingChoice(&'static str),
    #[error("choice {chosen} out of range for a {kind} step with {available} alternatives")]
    InvalidChoice {
        kind: &'static str,
        chosen: usize,
        available: usize,
    },
    #[error("nothing to summarize: no execution branches given")]
    EmptyGroup,
    #[error("noun not found: {0}")]
    NounNotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Tuning knobs for summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Rows less likely than this are dropped before alignment.
    pub min_branch_probability: f64,
    /// Expand `Symbol` steps into the bodies of the nouns they reference.
    pub expand_symbols: bool,
    pub max_expansion_depth: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            min_branch_probability: 0.0,
            expand_symbols: true,
            max_expansion_depth: 16,
        }
    }
}

impl SummarizerConfig {
    pub fn min_branch_probability(mut self, probability: f64) -> Self {
        self.min_branch_probability = probability;
        self
    }

    pub fn expand_symbols(mut self, expand: bool) -> Self {
        self.expand_symbols = expand;
        self
    }

    pub fn max_expansion_depth(mut self, depth: usize) -> Self {
        self.max_expansion_depth = depth;
        self
    }

    pub fn load_from_ron(path: &Path) -> Result<Self, SummarizeError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<Self, SummarizeError> {
        Ok(ron::from_str(input)?)
    }
}

/// A summarized body plus the nouns rebuilt from expanded noun scopes.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub step: Step,
    pub nouns: Vec<Noun>,
}

impl Summary {
    /// `grammar` with `name`'s body replaced by the summary. Rebuilt nouns
    /// replace the bodies of existing nouns of the same name or are appended.
    pub fn apply_to(&self, grammar: &Grammar, name: &str) -> Grammar {
        let mut result = grammar.clone();
        for noun in &self.nouns {
            match result.nouns.iter_mut().find(|n| n.name == noun.name) {
                Some(existing) => existing.step = noun.step.clone(),
                None => result.nouns.push(noun.clone()),
            }
        }
        match result.nouns.iter_mut().find(|n| n.name == name) {
            Some(existing) => existing.step = self.step.clone(),
            None => result.nouns.push(Noun::new(name, self.step.clone())),
        }
        result
    }
}

pub struct Summarizer<'g> {
    config: SummarizerConfig,
    grammar: Option<&'g Grammar>,
    nouns: Vec<Noun>,
}

impl<'g> Summarizer<'g> {
    pub fn new(config: SummarizerConfig) -> Self {
        Self {
            config,
            grammar: None,
            nouns: Vec::new(),
        }
    }

    /// Resolve symbols against `grammar` while linearizing.
    pub fn with_grammar(mut self, grammar: &'g Grammar) -> Self {
        self.grammar = Some(grammar);
        self
    }

    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    /// Linearize `body` along every branch and merge the rows.
    pub fn linearize(
        &self,
        body: &Step,
        branches: &[ExecutionBranch],
    ) -> Result<LinearizationResult, SummarizeError> {
        let linearizer = Linearizer::new(&self.config, self.grammar);
        let mut merged: Option<LinearizationResult> = None;
        for branch in branches {
            let row = linearizer.linearize(body, branch)?;
            merged = Some(match merged {
                Some(acc) => acc.merge(row)?,
                None => row,
            });
        }
        merged.ok_or(SummarizeError::EmptyGroup)
    }

    pub fn summarize(
        &mut self,
        body: &Step,
        branches: &[ExecutionBranch],
    ) -> Result<Summary, SummarizeError> {
        let merged = self.linearize(body, branches)?;
        let step = self.summarize_linearization(&merged)?;
        info!(
            "summarized {} branches into a {} step with {} rebuilt nouns",
            branches.len(),
            step.kind(),
            self.nouns.len()
        );
        Ok(Summary {
            step,
            nouns: std::mem::take(&mut self.nouns),
        })
    }

    /// Summarize the body of the noun called `name`.
    pub fn summarize_noun(
        &mut self,
        name: &str,
        branches: &[ExecutionBranch],
    ) -> Result<Summary, SummarizeError> {
        let noun = self
            .grammar
            .and_then(|grammar| grammar.get(name))
            .ok_or_else(|| SummarizeError::NounNotFound(name.to_string()))?;
        self.summarize(&noun.step, branches)
    }

    /// Rebuild one step from aligned rows.
    pub fn summarize_linearization(
        &mut self,
        result: &LinearizationResult,
    ) -> Result<Step, SummarizeError> {
        let threshold = self.config.min_branch_probability;
        let groups = if threshold > 0.0
            && result.vertical.iter().any(|row| row.probability < threshold)
            && result.vertical.iter().any(|row| row.probability >= threshold)
        {
            let kept = result.clone().retain_rows(|row| row.probability >= threshold);
            debug!(
                "dropped {} rows below probability {}",
                result.rows() - kept.rows(),
                threshold
            );
            group(&kept)?
        } else {
            group(result)?
        };
        self.fold(groups)
    }

    /// Record a noun rebuilt from a noun scope. The first body for a name wins.
    pub fn create_noun(&mut self, name: &str, step: Step) {
        if self.nouns.iter().any(|noun| noun.name == name) {
            return;
        }
        self.nouns.push(Noun::new(name, step));
    }

    pub fn into_nouns(self) -> Vec<Noun> {
        self.nouns
    }

    fn fold(&mut self, groups: Vec<NestGroup>) -> Result<Step, SummarizeError> {
        let children = groups
            .into_iter()
            .map(|group| self.fold_group(group))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Step::Sequential { children }.normalize())
    }

    fn fold_group(&mut self, group: NestGroup) -> Result<Step, SummarizeError> {
        match group {
            NestGroup::Aligned(vertical) => combine(self, &vertical),
            NestGroup::Noun { identifier, inner } => {
                let body = self.summarize_linearization(&inner)?;
                self.create_noun(&identifier, body);
                Ok(Step::Symbol { identifier })
            }
            NestGroup::Filter {
                header,
                mut alternatives,
                branches,
            } => {
                for (chosen, inner) in branches {
                    let step = self.summarize_linearization(&inner)?;
                    if let Some(slot) = alternatives.get_mut(chosen) {
                        *slot = step;
                    }
                }
                Ok(match header {
                    FilterHeader::Random { probabilities } => Step::Random {
                        probabilities,
                        children: alternatives,
                    },
                    FilterHeader::If { condition } => Step::If {
                        children: std::iter::once(condition).chain(alternatives).collect(),
                    },
                    FilterHeader::Switch { value, cases } => Step::Switch {
                        cases,
                        children: std::iter::once(value).chain(alternatives).collect(),
                    },
                })
            }
            NestGroup::Split(classes) => {
                let total: f64 = classes.iter().map(|class| class.probability).sum();
                let count = classes.len() as f64;
                let mut probabilities = Vec::with_capacity(classes.len());
                let mut children = Vec::with_capacity(classes.len());
                for class in classes {
                    probabilities.push(if total > 0.0 {
                        class.probability / total
                    } else {
                        1.0 / count
                    });
                    children.push(if class.value.is_empty() {
                        Step::This
                    } else {
                        self.fold(class.value)?
                    });
                }
                Ok(Step::Random {
                    probabilities,
                    children,
                })
            }
        }
    }
}

/// Linearizer — flattens a rule body along one execution branch.
use serde::{Deserialize, Serialize};

use crate::core::summarizer::{SummarizeError, SummarizerConfig};
use crate::schema::linearized::{FilterHeader, LinearizationResult, LinearizedStep};
use crate::schema::step::{Grammar, Step};

/// One concrete execution of a rule body: the child picked at every
/// `Random`, `If` and `Switch` step, in the order they are reached.
///
/// For `If` the choice is 0 for the then-branch and 1 for the else-branch;
/// for `Switch` it indexes the cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionBranch {
    pub probability: f64,
    pub choices: Vec<usize>,
}

impl ExecutionBranch {
    pub fn new(probability: f64, choices: Vec<usize>) -> Self {
        Self {
            probability,
            choices,
        }
    }
}

pub struct Linearizer<'a> {
    config: &'a SummarizerConfig,
    grammar: Option<&'a Grammar>,
}

struct Cursor<'b> {
    choices: &'b [usize],
    next: usize,
    expanding: Vec<String>,
}

impl<'a> Linearizer<'a> {
    pub fn new(config: &'a SummarizerConfig, grammar: Option<&'a Grammar>) -> Self {
        Self { config, grammar }
    }

    /// Token stream of `body` along `branch`, as a one-row result.
    pub fn linearize(
        &self,
        body: &Step,
        branch: &ExecutionBranch,
    ) -> Result<LinearizationResult, SummarizeError> {
        let mut cursor = Cursor {
            choices: &branch.choices,
            next: 0,
            expanding: Vec::new(),
        };
        let mut tokens = Vec::new();
        self.emit(body, &mut cursor, &mut tokens)?;
        LinearizationResult::single(tokens, branch.probability)
    }

    fn emit(
        &self,
        step: &Step,
        cursor: &mut Cursor<'_>,
        out: &mut Vec<LinearizedStep>,
    ) -> Result<(), SummarizeError> {
        match step {
            Step::This => out.push(LinearizedStep::This),
            Step::Null => out.push(LinearizedStep::Null),
            Step::Return => out.push(LinearizedStep::Return),
            Step::Raw(value) => out.push(LinearizedStep::Raw(value.clone())),
            Step::GetVariable { identifier } => out.push(LinearizedStep::GetVariable {
                identifier: identifier.clone(),
            }),
            Step::Symbol { identifier } => self.emit_symbol(identifier, cursor, out)?,
            Step::Sequential { children } => {
                for child in children {
                    self.emit(child, cursor, out)?;
                }
            }
            Step::SetVariable {
                identifier,
                children,
            } => out.push(LinearizedStep::SetVariable {
                identifier: identifier.clone(),
                children: self.nested(children, cursor)?,
            }),
            Step::Operation {
                identifier,
                children,
            } => out.push(LinearizedStep::Operation {
                identifier: identifier.clone(),
                children: self.nested(children, cursor)?,
            }),
            Step::Operator { operator, children } => out.push(LinearizedStep::Operator {
                operator: *operator,
                children: self.nested(children, cursor)?,
            }),
            Step::Parallel { children } => out.push(LinearizedStep::Parallel {
                children: self.nested(children, cursor)?,
            }),
            Step::Bracket { children } => out.push(LinearizedStep::Bracket {
                children: self.nested(children, cursor)?,
            }),
            Step::Random {
                probabilities,
                children,
            } => self.emit_filter(
                FilterHeader::Random {
                    probabilities: probabilities.clone(),
                },
                children,
                cursor,
                out,
            )?,
            Step::If { children } => {
                let (condition, branches) = split_head(children);
                self.emit_filter(FilterHeader::If { condition }, branches, cursor, out)?
            }
            Step::Switch { cases, children } => {
                let (value, branches) = split_head(children);
                self.emit_filter(
                    FilterHeader::Switch {
                        value,
                        cases: cases.clone(),
                    },
                    branches,
                    cursor,
                    out,
                )?
            }
        }
        Ok(())
    }

    fn emit_symbol(
        &self,
        identifier: &str,
        cursor: &mut Cursor<'_>,
        out: &mut Vec<LinearizedStep>,
    ) -> Result<(), SummarizeError> {
        let expandable = self.config.expand_symbols
            && cursor.expanding.len() < self.config.max_expansion_depth
            && !cursor.expanding.iter().any(|name| name == identifier);
        let noun = self
            .grammar
            .filter(|_| expandable)
            .and_then(|grammar| grammar.get(identifier));
        let Some(noun) = noun else {
            out.push(LinearizedStep::Symbol {
                identifier: identifier.to_string(),
            });
            return Ok(());
        };

        out.push(LinearizedStep::NounStart {
            identifier: identifier.to_string(),
        });
        cursor.expanding.push(identifier.to_string());
        self.emit(&noun.step, cursor, out)?;
        cursor.expanding.pop();
        out.push(LinearizedStep::NounEnd {
            identifier: identifier.to_string(),
        });
        Ok(())
    }

    fn emit_filter(
        &self,
        header: FilterHeader,
        alternatives: &[Step],
        cursor: &mut Cursor<'_>,
        out: &mut Vec<LinearizedStep>,
    ) -> Result<(), SummarizeError> {
        let chosen = *cursor
            .choices
            .get(cursor.next)
            .ok_or(SummarizeError::MissingChoice(header.kind()))?;
        cursor.next += 1;
        if chosen >= alternatives.len() {
            return Err(SummarizeError::InvalidChoice {
                kind: header.kind(),
                chosen,
                available: alternatives.len(),
            });
        }

        let mut kept = alternatives.to_vec();
        kept[chosen] = Step::This;
        out.push(LinearizedStep::FilterStart {
            header,
            chosen,
            alternatives: kept,
        });
        self.emit(&alternatives[chosen], cursor, out)?;
        out.push(LinearizedStep::FilterEnd);
        Ok(())
    }

    /// Children of a token-forming step, each linearized on its own.
    fn nested(
        &self,
        children: &[Step],
        cursor: &mut Cursor<'_>,
    ) -> Result<Vec<LinearizationResult>, SummarizeError> {
        children
            .iter()
            .map(|child| {
                let mut tokens = Vec::new();
                self.emit(child, cursor, &mut tokens)?;
                LinearizationResult::single(tokens, 1.0)
            })
            .collect()
    }
}

fn split_head(children: &[Step]) -> (Step, &[Step]) {
    match children.split_first() {
        Some((head, rest)) => (head.clone(), rest),
        None => (Step::This, &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::step::{Noun, Value};

    fn linearize(body: &Step, choices: Vec<usize>, grammar: Option<&Grammar>) -> Vec<LinearizedStep> {
        let config = SummarizerConfig::default();
        let result = Linearizer::new(&config, grammar)
            .linearize(body, &ExecutionBranch::new(1.0, choices))
            .unwrap();
        result.vertical.into_iter().next().unwrap().value
    }

    #[test]
    fn sequential_is_flattened() {
        let body = Step::sequential(vec![Step::This, Step::Raw(Value::Bool(true)), Step::Null]);
        assert_eq!(
            linearize(&body, vec![], None),
            vec![
                LinearizedStep::This,
                LinearizedStep::Raw(Value::Bool(true)),
                LinearizedStep::Null
            ]
        );
    }

    #[test]
    fn filter_emits_markers_around_chosen_child() {
        let body = Step::Random {
            probabilities: vec![0.5, 0.5],
            children: vec![Step::Null, Step::raw_number(2.0)],
        };
        let tokens = linearize(&body, vec![1], None);
        assert_eq!(tokens.len(), 3);
        assert!(matches!(
            &tokens[0],
            LinearizedStep::FilterStart { chosen: 1, alternatives, .. }
                if alternatives == &vec![Step::Null, Step::This]
        ));
        assert_eq!(tokens[1], LinearizedStep::Raw(Value::Number(2.0)));
        assert_eq!(tokens[2], LinearizedStep::FilterEnd);
    }

    #[test]
    fn symbols_expand_into_noun_scopes_without_recursing() {
        let grammar = Grammar::new(vec![Noun::new(
            "Floor",
            Step::sequential(vec![Step::This, Step::symbol("Floor")]),
        )]);
        let tokens = linearize(&Step::symbol("Floor"), vec![], Some(&grammar));
        assert_eq!(
            tokens,
            vec![
                LinearizedStep::NounStart {
                    identifier: "Floor".to_string()
                },
                LinearizedStep::This,
                LinearizedStep::Symbol {
                    identifier: "Floor".to_string()
                },
                LinearizedStep::NounEnd {
                    identifier: "Floor".to_string()
                },
            ]
        );
    }

    #[test]
    fn operation_children_are_nested_results() {
        let body = Step::operation("extrude", vec![Step::raw_number(1.0), Step::Null]);
        let tokens = linearize(&body, vec![], None);
        let LinearizedStep::Operation { children, .. } = &tokens[0] else {
            panic!("expected an operation token");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].vertical[0].probability, 1.0);
    }

    #[test]
    fn missing_and_invalid_choices_fail() {
        let config = SummarizerConfig::default();
        let body = Step::If {
            children: vec![Step::Raw(Value::Bool(true)), Step::Null, Step::This],
        };
        let linearizer = Linearizer::new(&config, None);
        assert!(matches!(
            linearizer.linearize(&body, &ExecutionBranch::new(1.0, vec![])),
            Err(SummarizeError::MissingChoice("if"))
        ));
        assert!(matches!(
            linearizer.linearize(&body, &ExecutionBranch::new(1.0, vec![4])),
            Err(SummarizeError::InvalidChoice { chosen: 4, available: 2, .. })
        ));
    }
}

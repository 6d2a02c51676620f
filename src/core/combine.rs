/// Combiner — rebuilds one step from a vertical of combineable tokens.
use crate::core::summarizer::{SummarizeError, Summarizer};
use crate::schema::linearized::{LinearizationResult, LinearizedStep, Vertical};
use crate::schema::step::{Step, Value};

/// Whether two tokens may share an aligned position.
///
/// Tokens must have the same kind; identifier-bearing tokens also need the
/// same identifier and raw tokens the same value. Nested children are never
/// compared, they get merged. Agrees with `combine_key`: two tokens are
/// combineable exactly when their keys are equal.
pub fn is_combineable(a: &LinearizedStep, b: &LinearizedStep) -> bool {
    use crate::schema::linearized::LinearizedStep as L;
    match (a, b) {
        (L::NounStart { identifier: x }, L::NounStart { identifier: y })
        | (L::NounEnd { identifier: x }, L::NounEnd { identifier: y })
        | (L::Symbol { identifier: x }, L::Symbol { identifier: y })
        | (L::GetVariable { identifier: x }, L::GetVariable { identifier: y })
        | (L::SetVariable { identifier: x, .. }, L::SetVariable { identifier: y, .. })
        | (L::Operation { identifier: x, .. }, L::Operation { identifier: y, .. }) => x == y,
        (L::Raw(x), L::Raw(y)) => same_value(x, y),
        (L::Operator { operator: x, .. }, L::Operator { operator: y, .. }) => x == y,
        (
            L::FilterStart {
                header: x,
                alternatives: xs,
                ..
            },
            L::FilterStart {
                header: y,
                alternatives: ys,
                ..
            },
        ) => xs.len() == ys.len() && format!("{:?}", x) == format!("{:?}", y),
        _ => a.kind() == b.kind(),
    }
}

/// Numbers compare by bit pattern, so `NaN` matches itself and `-0.0`
/// differs from `0.0`.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

/// Canonical key of a token's combineable identity.
pub fn combine_key(token: &LinearizedStep) -> String {
    match token {
        LinearizedStep::NounStart { identifier }
        | LinearizedStep::NounEnd { identifier }
        | LinearizedStep::Symbol { identifier }
        | LinearizedStep::GetVariable { identifier }
        | LinearizedStep::SetVariable { identifier, .. }
        | LinearizedStep::Operation { identifier, .. } => format!("{}:{}", token.kind(), identifier),
        LinearizedStep::FilterStart {
            header,
            alternatives,
            ..
        } => format!("filterStart:{:?}:{}", header, alternatives.len()),
        LinearizedStep::Raw(Value::Number(n)) => format!("raw:number:{:016x}", n.to_bits()),
        LinearizedStep::Raw(value) => format!("raw:{:?}", value),
        LinearizedStep::Operator { operator, .. } => format!("operator:{:?}", operator),
        other => other.kind().to_string(),
    }
}

/// Rebuild the step a vertical of combineable tokens came from.
///
/// The first row is the template. Children of token-forming steps are merged
/// slot by slot across rows and summarized again, so rows may disagree on
/// arity: the result has as many children as the longest row.
pub fn combine(
    summarizer: &mut Summarizer<'_>,
    vertical: &Vertical<LinearizedStep>,
) -> Result<Step, SummarizeError> {
    let Some(first) = vertical.first() else {
        return Ok(Step::This);
    };
    let step = match &first.value {
        LinearizedStep::This => Step::This,
        LinearizedStep::Null => Step::Null,
        LinearizedStep::Return => Step::Return,
        LinearizedStep::Raw(value) => Step::Raw(value.clone()),
        LinearizedStep::Symbol { identifier } => Step::Symbol {
            identifier: identifier.clone(),
        },
        LinearizedStep::GetVariable { identifier } => Step::GetVariable {
            identifier: identifier.clone(),
        },
        LinearizedStep::SetVariable { identifier, .. } => Step::SetVariable {
            identifier: identifier.clone(),
            children: summarize_children(summarizer, vertical)?,
        },
        LinearizedStep::Operation { identifier, .. } => Step::Operation {
            identifier: identifier.clone(),
            children: summarize_children(summarizer, vertical)?,
        },
        LinearizedStep::Operator { operator, .. } => Step::Operator {
            operator: *operator,
            children: summarize_children(summarizer, vertical)?,
        },
        LinearizedStep::Parallel { .. } => Step::Parallel {
            children: summarize_children(summarizer, vertical)?,
        },
        LinearizedStep::Bracket { .. } => Step::Bracket {
            children: summarize_children(summarizer, vertical)?,
        },
        LinearizedStep::NounStart { .. }
        | LinearizedStep::NounEnd { .. }
        | LinearizedStep::FilterStart { .. }
        | LinearizedStep::FilterEnd => {
            return Err(SummarizeError::BoundaryToken(first.value.kind()));
        }
    };
    Ok(step)
}

fn summarize_children(
    summarizer: &mut Summarizer<'_>,
    vertical: &Vertical<LinearizedStep>,
) -> Result<Vec<Step>, SummarizeError> {
    let arity = vertical
        .iter()
        .filter_map(|row| row.value.children().map(<[_]>::len))
        .max()
        .unwrap_or(0);

    let mut children = Vec::with_capacity(arity);
    for slot in 0..arity {
        let mut merged: Option<LinearizationResult> = None;
        for row in vertical {
            let Some(child) = row.value.children().and_then(|c| c.get(slot)) else {
                continue;
            };
            let part = child.clone().with_probability(row.probability);
            merged = Some(match merged {
                Some(acc) => acc.merge(part)?,
                None => part,
            });
        }
        children.push(match merged {
            Some(result) => summarizer.summarize_linearization(&result)?,
            None => Step::This,
        });
    }
    Ok(children)
}

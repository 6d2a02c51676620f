/// Aligner — groups parallel token rows into nest groups.
///
/// Rows are compared in top-level units: a plain token, or a whole
/// `NounStart..NounEnd` / `FilterStart..FilterEnd` scope. Two rows stay in
/// one group for as long as their units are combineable; the separation
/// matrix caches how long that is for every pair.
use log::debug;
use std::collections::BTreeMap;

use crate::core::combine::{combine_key, is_combineable};
use crate::core::summarizer::SummarizeError;
use crate::schema::linearized::{
    FilterHeader, Horizontal, LinearizationResult, LinearizedStep, Vertical, Weighted,
};
use crate::schema::step::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Token(usize),
    /// Indices of the start marker and its matching end marker.
    Scope(usize, usize),
}

/// One output position of the aligned rows.
#[derive(Debug, Clone, PartialEq)]
pub enum NestGroup {
    /// One combineable token per row.
    Aligned(Vertical<LinearizedStep>),
    /// Every row entered the same noun.
    Noun {
        identifier: String,
        inner: LinearizationResult,
    },
    /// Every row passed the same filter, possibly choosing different children.
    Filter {
        header: FilterHeader,
        alternatives: Vec<Step>,
        branches: BTreeMap<usize, LinearizationResult>,
    },
    /// The rows diverge here. Each class carries the groups of its rows from
    /// this position on and their summed probability.
    Split(Vec<Weighted<Vec<NestGroup>>>),
}

fn units(tokens: &[LinearizedStep]) -> Result<Vec<Unit>, SummarizeError> {
    let mut out = Vec::new();
    let mut open: Option<(usize, usize)> = None;
    for (i, token) in tokens.iter().enumerate() {
        let opens = matches!(token, LinearizedStep::NounStart { .. } | LinearizedStep::FilterStart { .. });
        let closes = matches!(token, LinearizedStep::NounEnd { .. } | LinearizedStep::FilterEnd);
        let Some((start, depth)) = open.as_mut() else {
            if opens {
                open = Some((i, 1));
            } else if closes {
                return Err(SummarizeError::UnbalancedScope(i));
            } else {
                out.push(Unit::Token(i));
            }
            continue;
        };
        if opens {
            *depth += 1;
        } else if closes {
            *depth -= 1;
            if *depth == 0 {
                let start = *start;
                if !scope_matches(&tokens[start], token) {
                    return Err(SummarizeError::UnbalancedScope(i));
                }
                out.push(Unit::Scope(start, i));
                open = None;
            }
        }
    }
    match open {
        Some((start, _)) => Err(SummarizeError::UnbalancedScope(start)),
        None => Ok(out),
    }
}

fn scope_matches(start: &LinearizedStep, end: &LinearizedStep) -> bool {
    match (start, end) {
        (LinearizedStep::NounStart { identifier: a }, LinearizedStep::NounEnd { identifier: b }) => a == b,
        (LinearizedStep::FilterStart { .. }, LinearizedStep::FilterEnd) => true,
        _ => false,
    }
}

fn head(tokens: &[LinearizedStep], unit: Unit) -> &LinearizedStep {
    match unit {
        Unit::Token(i) | Unit::Scope(i, _) => &tokens[i],
    }
}

fn units_combineable(a: &[LinearizedStep], ua: Unit, b: &[LinearizedStep], ub: Unit) -> bool {
    match (ua, ub) {
        (Unit::Token(_), Unit::Token(_)) | (Unit::Scope(..), Unit::Scope(..)) => {
            is_combineable(head(a, ua), head(b, ub))
        }
        _ => false,
    }
}

fn shared_prefix(a: &[LinearizedStep], ua: &[Unit], b: &[LinearizedStep], ub: &[Unit]) -> usize {
    ua.iter()
        .zip(ub)
        .take_while(|(x, y)| units_combineable(a, **x, b, **y))
        .count()
}

impl LinearizationResult {
    /// A result holding one row.
    pub fn single(tokens: Horizontal<LinearizedStep>, probability: f64) -> Result<Self, SummarizeError> {
        let count = units(&tokens)?.len();
        Ok(Self {
            vertical: vec![Weighted::new(tokens, probability)],
            separation_matrix: vec![vec![count]],
        })
    }

    /// Build a result from rows, computing the full separation matrix.
    pub fn from_rows(rows: Vertical<Horizontal<LinearizedStep>>) -> Result<Self, SummarizeError> {
        let unit_rows = rows
            .iter()
            .map(|row| units(&row.value))
            .collect::<Result<Vec<_>, _>>()?;
        let n = rows.len();
        let mut matrix = vec![vec![0; n]; n];
        for i in 0..n {
            matrix[i][i] = unit_rows[i].len();
            for j in (i + 1)..n {
                let shared = shared_prefix(&rows[i].value, &unit_rows[i], &rows[j].value, &unit_rows[j]);
                matrix[i][j] = shared;
                matrix[j][i] = shared;
            }
        }
        Ok(Self {
            vertical: rows,
            separation_matrix: matrix,
        })
    }

    /// Stack `other`'s rows below this result's, filling in the cross entries
    /// of the separation matrix.
    pub fn merge(mut self, other: LinearizationResult) -> Result<Self, SummarizeError> {
        let left = self.vertical.len();
        let right = other.vertical.len();
        let left_units = self
            .vertical
            .iter()
            .map(|row| units(&row.value))
            .collect::<Result<Vec<_>, _>>()?;
        let right_units = other
            .vertical
            .iter()
            .map(|row| units(&row.value))
            .collect::<Result<Vec<_>, _>>()?;

        let mut matrix = vec![vec![0; left + right]; left + right];
        for i in 0..left {
            for j in 0..left {
                matrix[i][j] = self.separation_matrix[i][j];
            }
        }
        for i in 0..right {
            for j in 0..right {
                matrix[left + i][left + j] = other.separation_matrix[i][j];
            }
        }
        for i in 0..left {
            for j in 0..right {
                let shared = shared_prefix(
                    &self.vertical[i].value,
                    &left_units[i],
                    &other.vertical[j].value,
                    &right_units[j],
                );
                matrix[i][left + j] = shared;
                matrix[left + j][i] = shared;
            }
        }

        self.vertical.extend(other.vertical);
        self.separation_matrix = matrix;
        Ok(self)
    }

    /// Keep only the rows `keep` accepts, along with their matrix entries.
    pub fn retain_rows<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&Weighted<Horizontal<LinearizedStep>>) -> bool,
    {
        let kept: Vec<usize> = (0..self.vertical.len())
            .filter(|&i| keep(&self.vertical[i]))
            .collect();
        let separation_matrix = kept
            .iter()
            .map(|&i| kept.iter().map(|&j| self.separation_matrix[i][j]).collect())
            .collect();
        let mut rows: Vec<Option<_>> = self.vertical.into_iter().map(Some).collect();
        let vertical = kept.iter().filter_map(|&i| rows[i].take()).collect();
        Self {
            vertical,
            separation_matrix,
        }
    }
}

struct Row<'r> {
    tokens: &'r [LinearizedStep],
    units: Vec<Unit>,
    probability: f64,
}

/// Align the rows of `result` into nest groups.
pub fn group(result: &LinearizationResult) -> Result<Vec<NestGroup>, SummarizeError> {
    let rows = result
        .vertical
        .iter()
        .map(|row| {
            Ok::<_, SummarizeError>(Row {
                tokens: &row.value,
                units: units(&row.value)?,
                probability: row.probability,
            })
        })
        .collect::<Result<Vec<_>, SummarizeError>>()?;
    let members: Vec<usize> = (0..rows.len()).collect();
    align(&rows, &result.separation_matrix, &members, 0)
}

fn align(
    rows: &[Row<'_>],
    matrix: &[Vec<usize>],
    members: &[usize],
    from: usize,
) -> Result<Vec<NestGroup>, SummarizeError> {
    let mut groups = Vec::new();
    let mut position = from;
    loop {
        let active: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| rows[i].units.len() > position)
            .collect();
        if active.is_empty() {
            return Ok(groups);
        }

        let mut classes: Vec<Vec<usize>> = Vec::new();
        for &i in &active {
            match classes.iter_mut().find(|class| matrix[class[0]][i] > position) {
                Some(class) => class.push(i),
                None => classes.push(vec![i]),
            }
        }

        if classes.len() == 1 && active.len() == members.len() {
            groups.push(build_group(rows, &active, position)?);
            position += 1;
            continue;
        }

        debug!(
            "rows diverge at unit {} into {} classes",
            position,
            classes.len() + usize::from(active.len() != members.len())
        );
        let mut split: Vec<(String, Weighted<Vec<NestGroup>>)> = Vec::new();
        let ended: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| rows[i].units.len() <= position)
            .collect();
        if !ended.is_empty() {
            let weight = ended.iter().map(|&i| rows[i].probability).sum();
            split.push((String::new(), Weighted::new(Vec::new(), weight)));
        }
        for class in classes {
            let first = &rows[class[0]];
            let key = combine_key(head(first.tokens, first.units[position]));
            let weight = class.iter().map(|&i| rows[i].probability).sum();
            let inner = align(rows, matrix, &class, position)?;
            split.push((key, Weighted::new(inner, weight)));
        }
        split.sort_by(|a, b| a.0.cmp(&b.0));
        groups.push(NestGroup::Split(split.into_iter().map(|(_, class)| class).collect()));
        return Ok(groups);
    }
}

fn build_group(rows: &[Row<'_>], class: &[usize], position: usize) -> Result<NestGroup, SummarizeError> {
    let first = &rows[class[0]];
    match first.units[position] {
        Unit::Token(_) => Ok(NestGroup::Aligned(
            class
                .iter()
                .map(|&i| {
                    let row = &rows[i];
                    Weighted::new(head(row.tokens, row.units[position]).clone(), row.probability)
                })
                .collect(),
        )),
        Unit::Scope(start, _) => match &first.tokens[start] {
            LinearizedStep::NounStart { identifier } => Ok(NestGroup::Noun {
                identifier: identifier.clone(),
                inner: LinearizationResult::from_rows(
                    class.iter().map(|&i| scope_body(&rows[i], position)).collect(),
                )?,
            }),
            LinearizedStep::FilterStart {
                header,
                alternatives,
                ..
            } => {
                // Rows may disagree on a slot they did not choose; the
                // smallest alternative by debug form wins in every row order.
                let mut picked: Vec<Option<(String, &Step)>> = vec![None; alternatives.len()];
                let mut chosen_rows: BTreeMap<usize, Vertical<Horizontal<LinearizedStep>>> = BTreeMap::new();
                for &i in class {
                    let row = &rows[i];
                    let LinearizedStep::FilterStart {
                        chosen,
                        alternatives: row_alternatives,
                        ..
                    } = head(row.tokens, row.units[position])
                    else {
                        continue;
                    };
                    chosen_rows
                        .entry(*chosen)
                        .or_default()
                        .push(scope_body(row, position));
                    for (slot, (alternative, pick)) in row_alternatives.iter().zip(picked.iter_mut()).enumerate() {
                        if slot == *chosen {
                            continue;
                        }
                        let key = format!("{:?}", alternative);
                        if pick.as_ref().map_or(true, |(current, _)| key < *current) {
                            *pick = Some((key, alternative));
                        }
                    }
                }
                let alternatives: Vec<Step> = picked
                    .into_iter()
                    .map(|pick| pick.map_or(Step::This, |(_, step)| step.clone()))
                    .collect();
                let branches = chosen_rows
                    .into_iter()
                    .map(|(chosen, rows)| Ok::<_, SummarizeError>((chosen, LinearizationResult::from_rows(rows)?)))
                    .collect::<Result<BTreeMap<_, _>, SummarizeError>>()?;
                Ok(NestGroup::Filter {
                    header: header.clone(),
                    alternatives,
                    branches,
                })
            }
            other => Err(SummarizeError::BoundaryToken(other.kind())),
        },
    }
}

fn scope_body(row: &Row<'_>, position: usize) -> Weighted<Horizontal<LinearizedStep>> {
    let tokens = match row.units[position] {
        Unit::Scope(start, end) => row.tokens[start + 1..end].to_vec(),
        Unit::Token(_) => Vec::new(),
    };
    Weighted::new(tokens, row.probability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::step::Value;

    fn raw(n: f64) -> LinearizedStep {
        LinearizedStep::Raw(Value::Number(n))
    }

    fn rows(rows: Vec<(Vec<LinearizedStep>, f64)>) -> LinearizationResult {
        rows.into_iter()
            .map(|(tokens, p)| LinearizationResult::single(tokens, p).unwrap())
            .reduce(|a, b| a.merge(b).unwrap())
            .unwrap()
    }

    #[test]
    fn separation_matrix_counts_shared_units() {
        let result = rows(vec![
            (vec![raw(1.0), raw(2.0), raw(3.0)], 0.5),
            (vec![raw(1.0), raw(2.0), raw(4.0)], 0.3),
            (vec![raw(9.0)], 0.2),
        ]);
        assert_eq!(
            result.separation_matrix,
            vec![vec![3, 2, 0], vec![2, 3, 0], vec![0, 0, 1]]
        );
        let rebuilt = LinearizationResult::from_rows(result.vertical.clone()).unwrap();
        assert_eq!(rebuilt.separation_matrix, result.separation_matrix);
    }

    #[test]
    fn unbalanced_scopes_are_rejected() {
        let tokens = vec![LinearizedStep::NounStart {
            identifier: "A".to_string(),
        }];
        assert!(matches!(
            LinearizationResult::single(tokens, 1.0),
            Err(SummarizeError::UnbalancedScope(0))
        ));
        assert!(LinearizationResult::single(vec![LinearizedStep::FilterEnd], 1.0).is_err());
    }

    #[test]
    fn identical_rows_align_position_by_position() {
        let result = rows(vec![(vec![raw(1.0), LinearizedStep::Null], 0.6), (vec![raw(1.0), LinearizedStep::Null], 0.4)]);
        let groups = group(&result).unwrap();
        assert_eq!(groups.len(), 2);
        assert!(matches!(&groups[0], NestGroup::Aligned(v) if v.len() == 2));
    }

    #[test]
    fn divergent_rows_split_into_classes() {
        let result = rows(vec![
            (vec![raw(1.0), raw(2.0)], 0.5),
            (vec![raw(1.0)], 0.25),
            (vec![raw(1.0), raw(3.0)], 0.25),
        ]);
        let groups = group(&result).unwrap();
        assert_eq!(groups.len(), 2);
        let NestGroup::Split(classes) = &groups[1] else {
            panic!("expected a split");
        };
        assert_eq!(classes.len(), 3);
        assert!(classes[0].value.is_empty());
        assert_eq!(classes[0].probability, 0.25);
        assert_eq!(classes[1].probability, 0.5);
    }

    #[test]
    fn nan_rows_align_instead_of_splitting() {
        let nan = LinearizedStep::Raw(Value::Number(f64::NAN));
        let result = rows(vec![(vec![nan.clone(), raw(1.0)], 0.5), (vec![nan, raw(2.0)], 0.5)]);
        assert_eq!(result.separation_matrix[0][1], 1);
        let groups = group(&result).unwrap();
        assert!(matches!(&groups[0], NestGroup::Aligned(v) if v.len() == 2));
        assert!(matches!(&groups[1], NestGroup::Split(classes) if classes.len() == 2));
    }

    #[test]
    fn filter_alternatives_are_picked_regardless_of_row_order() {
        let filter = |chosen: usize, alternatives: Vec<Step>| {
            vec![
                LinearizedStep::FilterStart {
                    header: FilterHeader::Random {
                        probabilities: vec![0.5, 0.5, 0.0],
                    },
                    chosen,
                    alternatives,
                },
                raw(1.0),
                LinearizedStep::FilterEnd,
            ]
        };
        let a = filter(0, vec![Step::This, Step::raw_number(3.0), Step::Null]);
        let b = filter(1, vec![Step::raw_number(1.0), Step::This, Step::Return]);
        let forward = group(&rows(vec![(a.clone(), 0.5), (b.clone(), 0.5)])).unwrap();
        let backward = group(&rows(vec![(b, 0.5), (a, 0.5)])).unwrap();
        let NestGroup::Filter { alternatives, branches, .. } = &forward[0] else {
            panic!("expected a filter group");
        };
        assert_eq!(
            alternatives,
            &vec![Step::raw_number(1.0), Step::raw_number(3.0), Step::Null]
        );
        assert_eq!(branches.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        let NestGroup::Filter {
            alternatives: reversed,
            ..
        } = &backward[0]
        else {
            panic!("expected a filter group");
        };
        assert_eq!(reversed, alternatives);
    }

    #[test]
    fn retain_rows_shrinks_the_matrix() {
        let result = rows(vec![
            (vec![raw(1.0)], 0.9),
            (vec![raw(1.0), raw(2.0)], 0.01),
            (vec![raw(5.0)], 0.5),
        ]);
        let kept = result.retain_rows(|row| row.probability >= 0.1);
        assert_eq!(kept.rows(), 2);
        assert_eq!(kept.separation_matrix, vec![vec![1, 0], vec![0, 1]]);
    }
}

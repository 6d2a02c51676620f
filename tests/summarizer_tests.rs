/// Summarizer integration tests: fixture pipeline and algebraic properties.

use std::path::Path;

use procgen_grammar::core::linearize::ExecutionBranch;
use procgen_grammar::core::summarizer::{Summarizer, SummarizerConfig};
use procgen_grammar::schema::linearized::LinearizationResult;
use procgen_grammar::schema::step::{Grammar, Noun, Operator, Step};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

fn tower() -> Grammar {
    Grammar::load_from_ron(Path::new("tests/fixtures/tower.ron")).unwrap()
}

fn config() -> SummarizerConfig {
    SummarizerConfig::load_from_ron(Path::new("tests/fixtures/summarizer.ron")).unwrap()
}

#[test]
fn config_fixture_loads() {
    let config = config();
    assert_eq!(config.min_branch_probability, 0.05);
    assert_eq!(config.max_expansion_depth, 4);
    assert!(config.expand_symbols);
}

#[test]
fn summarizing_every_branch_of_a_noun_reproduces_it() {
    let grammar = tower();
    let mut summarizer = Summarizer::new(config()).with_grammar(&grammar);
    let summary = summarizer
        .summarize_noun(
            "Tower",
            &[
                ExecutionBranch::new(0.5, vec![0]),
                ExecutionBranch::new(0.5, vec![1]),
            ],
        )
        .unwrap();

    assert_eq!(summary.step, grammar.get("Tower").unwrap().step);
    let names: Vec<&str> = summary.nouns.iter().map(|noun| noun.name.as_str()).collect();
    assert_eq!(names, vec!["Floor", "Spire", "Roof"]);
    assert_eq!(summary.apply_to(&grammar, "Tower"), grammar);
}

#[test]
fn unexpanded_symbols_stay_symbols() {
    let grammar = tower();
    let mut summarizer =
        Summarizer::new(config().expand_symbols(false)).with_grammar(&grammar);
    let summary = summarizer
        .summarize_noun("Tower", &[ExecutionBranch::new(1.0, vec![])])
        .unwrap();
    assert_eq!(summary.step, grammar.get("Tower").unwrap().step);
    assert!(summary.nouns.is_empty());
}

fn traces(grammar: &Grammar) -> Vec<LinearizationResult> {
    let summarizer = Summarizer::new(SummarizerConfig::default()).with_grammar(grammar);
    let bodies = [
        (
            Step::sequential(vec![
                Step::symbol("Floor"),
                Step::raw_number(1.0),
                Step::raw_number(2.0),
            ]),
            0.5,
        ),
        (
            Step::sequential(vec![Step::symbol("Floor"), Step::raw_number(1.0)]),
            0.25,
        ),
        (
            Step::sequential(vec![
                Step::symbol("Floor"),
                Step::operation("taper", vec![Step::raw_number(1.0), Step::Null]),
            ]),
            0.125,
        ),
        (Step::Null, 0.125),
    ];
    bodies
        .iter()
        .map(|(body, p)| {
            summarizer
                .linearize(body, &[ExecutionBranch::new(*p, vec![])])
                .unwrap()
        })
        .collect()
}

fn summarize_rows(grammar: &Grammar, rows: Vec<LinearizationResult>) -> (Step, Vec<Noun>) {
    let merged = rows
        .into_iter()
        .reduce(|a, b| a.merge(b).unwrap())
        .unwrap();
    let mut summarizer = Summarizer::new(SummarizerConfig::default()).with_grammar(grammar);
    let step = summarizer.summarize_linearization(&merged).unwrap();
    (step, summarizer.into_nouns())
}

#[test]
fn divergent_traces_fold_into_weighted_randoms() {
    let grammar = tower();
    let (step, nouns) = summarize_rows(&grammar, traces(&grammar));

    let Step::Random {
        probabilities,
        children,
    } = &step
    else {
        panic!("expected a random step, got {:?}", step);
    };
    assert_eq!(probabilities, &vec![0.875, 0.125]);
    assert_eq!(children[1], Step::Null);
    let Step::Sequential { children: head } = &children[0] else {
        panic!("expected a sequential class");
    };
    assert_eq!(head[0], Step::symbol("Floor"));
    assert!(matches!(&head[1], Step::Random { children, .. } if children.len() == 2));
    assert_eq!(nouns, vec![grammar.get("Floor").unwrap().clone()]);
}

#[test]
fn branch_order_does_not_change_the_result() {
    let grammar = tower();
    let expected = summarize_rows(&grammar, traces(&grammar));
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..8 {
        let mut rows = traces(&grammar);
        rows.shuffle(&mut rng);
        assert_eq!(summarize_rows(&grammar, rows), expected);
    }
}

#[test]
fn unchosen_filter_alternatives_do_not_depend_on_branch_order() {
    let summarizer = Summarizer::new(SummarizerConfig::default());
    let random = |other: f64| Step::Random {
        probabilities: vec![0.5, 0.5],
        children: vec![Step::raw_number(1.0), Step::raw_number(other)],
    };
    let a = summarizer
        .linearize(&random(2.0), &[ExecutionBranch::new(0.5, vec![0])])
        .unwrap();
    let b = summarizer
        .linearize(&random(3.0), &[ExecutionBranch::new(0.5, vec![0])])
        .unwrap();

    let grammar = Grammar::default();
    let forward = summarize_rows(&grammar, vec![a.clone(), b.clone()]);
    let backward = summarize_rows(&grammar, vec![b, a]);
    assert_eq!(forward, backward);
    assert_eq!(forward.0, random(2.0));
}

fn plain_step() -> impl Strategy<Value = Step> {
    let leaf = prop_oneof![
        Just(Step::This),
        Just(Step::Null),
        Just(Step::Return),
        (0..5i32).prop_map(|n| Step::raw_number(n as f64)),
        Just(Step::get_variable("height")),
        Just(Step::symbol("Elsewhere")),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Step::sequential),
            prop::collection::vec(inner.clone(), 0..3)
                .prop_map(|children| Step::operation("extrude", children)),
            prop::collection::vec(inner.clone(), 2..3).prop_map(|children| Step::Operator {
                operator: Operator::Add,
                children,
            }),
            prop::collection::vec(inner, 1..3).prop_map(|children| Step::Parallel { children }),
        ]
    })
}

proptest! {
    #[test]
    fn one_branch_summarizes_to_itself(body in plain_step()) {
        let mut summarizer = Summarizer::new(SummarizerConfig::default());
        let summary = summarizer
            .summarize(&body, &[ExecutionBranch::new(1.0, vec![])])
            .unwrap();
        prop_assert_eq!(summary.step, body.normalize());
    }
}

fn branching_grammar() -> Grammar {
    Grammar::new(vec![
        Noun::new(
            "Floor",
            Step::Random {
                probabilities: vec![0.5, 0.5],
                children: vec![Step::raw_number(1.0), Step::Null],
            },
        ),
        Noun::new(
            "Roof",
            Step::sequential(vec![Step::symbol("Floor"), Step::raw_number(2.0)]),
        ),
    ])
}

/// Bodies whose filters all have two alternatives, so any choice below 2
/// is valid.
fn branching_step() -> impl Strategy<Value = Step> {
    let leaf = prop_oneof![
        Just(Step::This),
        Just(Step::Null),
        (0..3i32).prop_map(|n| Step::raw_number(n as f64)),
        Just(Step::symbol("Floor")),
        Just(Step::symbol("Roof")),
        Just(Step::symbol("Elsewhere")),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Step::sequential),
            prop::collection::vec(inner.clone(), 0..3)
                .prop_map(|children| Step::operation("extrude", children)),
            (prop::bool::ANY, inner.clone(), inner.clone()).prop_map(|(even, a, b)| Step::Random {
                probabilities: if even { vec![0.5, 0.5] } else { vec![0.25, 0.75] },
                children: vec![a, b],
            }),
            (0..2i32, inner.clone(), inner).prop_map(|(n, a, b)| Step::If {
                children: vec![Step::raw_number(n as f64), a, b],
            }),
        ]
    })
}

fn traced_body() -> impl Strategy<Value = (Step, Vec<usize>, f64)> {
    (
        branching_step(),
        prop::collection::vec(0..2usize, 64),
        prop::sample::select(vec![0.5, 0.25, 0.125, 0.0625]),
    )
}

proptest! {
    #[test]
    fn shuffled_branches_summarize_alike(
        traced in prop::collection::vec(traced_body(), 1..6),
        seed in any::<u64>(),
    ) {
        let grammar = branching_grammar();
        let summarizer = Summarizer::new(SummarizerConfig::default()).with_grammar(&grammar);
        let rows: Vec<LinearizationResult> = traced
            .iter()
            .map(|(body, choices, p)| {
                summarizer
                    .linearize(body, &[ExecutionBranch::new(*p, choices.clone())])
                    .unwrap()
            })
            .collect();
        let mut shuffled = rows.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));
        prop_assert_eq!(summarize_rows(&grammar, shuffled), summarize_rows(&grammar, rows));
    }
}

/// Preview — summarize a noun over a set of execution branches.
///
/// Usage: preview --grammar <path> --noun <name> --branches <path> [--config <path>]
///
/// The branches file is a RON list of `(probability: f64, choices: [usize])`.

use procgen_grammar::core::linearize::ExecutionBranch;
use procgen_grammar::core::summarizer::{Summarizer, SummarizerConfig};
use procgen_grammar::schema::step::Grammar;
use ron::ser::PrettyConfig;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut grammar_path = None;
    let mut noun = None;
    let mut branches_path = None;
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--grammar" if i + 1 < args.len() => {
                i += 1;
                grammar_path = Some(args[i].clone());
            }
            "--noun" if i + 1 < args.len() => {
                i += 1;
                noun = Some(args[i].clone());
            }
            "--branches" if i + 1 < args.len() => {
                i += 1;
                branches_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let (Some(grammar_path), Some(noun), Some(branches_path)) = (grammar_path, noun, branches_path)
    else {
        print_usage();
        process::exit(1);
    };

    let grammar = Grammar::load_from_ron(Path::new(&grammar_path)).unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to load grammar: {}", e);
        process::exit(1);
    });

    let config = match config_path {
        Some(path) => SummarizerConfig::load_from_ron(Path::new(&path)).unwrap_or_else(|e| {
            eprintln!("ERROR: Failed to load config: {}", e);
            process::exit(1);
        }),
        None => SummarizerConfig::default(),
    };

    let branches: Vec<ExecutionBranch> = std::fs::read_to_string(&branches_path)
        .map_err(|e| e.to_string())
        .and_then(|contents| ron::from_str(&contents).map_err(|e| e.to_string()))
        .unwrap_or_else(|e| {
            eprintln!("ERROR: Failed to load branches: {}", e);
            process::exit(1);
        });

    let mut summarizer = Summarizer::new(config).with_grammar(&grammar);
    let summary = summarizer
        .summarize_noun(&noun, &branches)
        .unwrap_or_else(|e| {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        });

    println!("=== {} ({} branches) ===\n", noun, branches.len());
    print_ron(&summary.step);
    for rebuilt in &summary.nouns {
        println!("\n--- {} ---\n", rebuilt.name);
        print_ron(&rebuilt.step);
    }
}

fn print_ron<T: serde::Serialize>(value: &T) {
    match ron::ser::to_string_pretty(value, PrettyConfig::default()) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("ERROR: {}", e),
    }
}

fn print_usage() {
    println!("Usage: preview --grammar <path> --noun <name> --branches <path> [--config <path>]");
}

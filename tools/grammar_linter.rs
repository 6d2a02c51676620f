/// Grammar Linter — checks grammar files for broken references and dead nouns.
///
/// Usage: grammar_linter <grammar_file_or_dir> [--descriptions <a,b,...>]

use procgen_grammar::core::grammar::{dedupe_nouns, traverse_steps};
use procgen_grammar::core::noun::remove_unused_nouns;
use procgen_grammar::schema::step::{Grammar, Step};
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: grammar_linter <grammar_file_or_dir> [--descriptions <a,b,...>]");
        process::exit(0);
    }

    let grammar_arg = &args[1];
    let mut descriptions: Option<Vec<String>> = None;

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--descriptions" && i + 1 < args.len() {
            i += 1;
            descriptions = Some(args[i].split(',').map(|s| s.trim().to_string()).collect());
        }
        i += 1;
    }

    let mut grammar = Grammar::default();
    let grammar_path = Path::new(grammar_arg);

    if grammar_path.is_file() {
        match Grammar::load_from_ron(grammar_path) {
            Ok(loaded) => grammar.nouns.extend(loaded.nouns),
            Err(e) => {
                eprintln!("ERROR: Failed to load grammar file: {}", e);
                process::exit(1);
            }
        }
    } else if grammar_path.is_dir() {
        load_grammars_recursive(grammar_path, &mut grammar);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", grammar_arg);
        process::exit(1);
    }

    let loaded = grammar.len();
    dedupe_nouns(&mut grammar.nouns);
    println!("Loaded {} nouns", grammar.len());

    let (mut errors, mut warnings) = lint_grammar(&grammar, descriptions.as_deref());
    if loaded != grammar.len() {
        warnings.insert(
            0,
            format!("{} duplicate noun names ignored (first wins)", loaded - grammar.len()),
        );
    }
    errors.sort();

    println!("\n=== Grammar Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn load_grammars_recursive(dir: &Path, grammar: &mut Grammar) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                load_grammars_recursive(&path, grammar);
            } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                match Grammar::load_from_ron(&path) {
                    Ok(loaded) => {
                        println!("  Loaded: {}", path.display());
                        grammar.nouns.extend(loaded.nouns);
                    }
                    Err(e) => {
                        eprintln!("  ERROR loading {}: {}", path.display(), e);
                    }
                }
            }
        }
    }
}

fn lint_grammar(grammar: &Grammar, descriptions: Option<&[String]>) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for noun in &grammar.nouns {
        traverse_steps(&noun.step, &mut |step| match step {
            Step::Symbol { identifier } if grammar.get(identifier).is_none() => {
                errors.push(format!(
                    "Noun '{}' references non-existent noun '{}'",
                    noun.name, identifier
                ));
            }
            Step::Random {
                probabilities,
                children,
            } if probabilities.len() != children.len() => {
                errors.push(format!(
                    "Noun '{}' has a random step with {} probabilities for {} children",
                    noun.name,
                    probabilities.len(),
                    children.len()
                ));
            }
            Step::If { children } if children.len() != 3 => {
                errors.push(format!(
                    "Noun '{}' has an if step with {} children (expected condition, then, else)",
                    noun.name,
                    children.len()
                ));
            }
            Step::Switch { cases, children } if children.len() != cases.len() + 1 => {
                errors.push(format!(
                    "Noun '{}' has a switch step with {} cases for {} branches",
                    noun.name,
                    cases.len(),
                    children.len().saturating_sub(1)
                ));
            }
            _ => {}
        });

        if matches!(&noun.step, Step::Symbol { identifier } if *identifier == noun.name) {
            errors.push(format!(
                "Noun '{}' only references itself (infinite recursion)",
                noun.name
            ));
        }
    }

    let names: Option<Vec<&str>> =
        descriptions.map(|list| list.iter().map(String::as_str).collect());
    let (kept, _) = remove_unused_nouns::<()>(grammar, &Vec::new(), names.as_deref());
    for noun in &grammar.nouns {
        if kept.get(&noun.name).is_none() {
            warnings.push(format!(
                "Noun '{}' is unreachable from any description root",
                noun.name
            ));
        }
    }

    (errors, warnings)
}

//! Procedural grammar engine — selection-anchored editing of production
//! rules and reconstruction of a rule from probability-weighted traces.
//!
//! Grammars and selection lists are immutable snapshots: every edit in
//! [`core::edit`] and [`core::noun`] consumes one and returns a new
//! [`core::state::EditorState`]. The summarizer in [`core::summarizer`]
//! linearizes parallel execution branches, aligns them into nest groups and
//! folds them back into a single rule body.

pub mod core;
pub mod schema;

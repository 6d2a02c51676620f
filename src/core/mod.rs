pub mod combine;
pub mod edit;
pub mod grammar;
pub mod group;
pub mod linearize;
pub mod noun;
pub mod selection;
pub mod state;
pub mod summarizer;

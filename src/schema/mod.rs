pub mod linearized;
pub mod selection;
pub mod step;

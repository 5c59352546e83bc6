pub mod meta;
pub mod predict;

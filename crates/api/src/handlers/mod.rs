pub mod result;
pub mod sketch;
pub mod styles;

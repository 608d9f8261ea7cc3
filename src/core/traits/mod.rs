pub mod interpreter;
pub mod judge;

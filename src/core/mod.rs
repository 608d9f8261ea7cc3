pub mod catalog;
pub mod domain;
pub mod pipeline;
pub mod resolver;
pub mod traits;

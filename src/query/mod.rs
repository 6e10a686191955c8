pub mod plan;
pub mod subquery;
pub mod translate;
pub mod compiler;
pub mod sql;
pub mod document;

pub mod group;
pub mod operand;

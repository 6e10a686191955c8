pub mod column;
pub mod coerce;

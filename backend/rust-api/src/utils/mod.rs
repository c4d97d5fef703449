pub mod coerce;
pub mod time;

pub mod accuracy;
pub mod aggregator;
pub mod selection;

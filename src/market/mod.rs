pub mod bracket;
pub mod matcher;

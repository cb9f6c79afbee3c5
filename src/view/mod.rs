pub mod assembler;
pub mod clock;
pub mod service;

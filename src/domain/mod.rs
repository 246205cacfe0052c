// Market analysis domain
pub mod market;

// Core trading domain
pub mod trading;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;

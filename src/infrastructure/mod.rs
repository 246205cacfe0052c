// In-memory collaborators for tests and the demo binary
pub mod mock;

// Debounced error logging
pub mod log_throttle;

// Random-walk candle generation for the demo binary
pub mod synthetic;

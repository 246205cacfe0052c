// Regime classification (rule + model)
pub mod classifiers;

// Strategy families and selection
pub mod strategies;

// Multi-timeframe confluence filter
pub mod mtf_filter;

// Global risk shield
pub mod shield;

// Event-driven decision loop
pub mod orchestrator;

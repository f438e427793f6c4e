// Pool and token domain events
pub mod events;

// Honeypot scoring results
pub mod honeypot;

// Filter presets and the pure policy check
pub mod filters;

// Order state machine
pub mod orders;

// Positions and exit triggers
pub mod positions;

// Priority fee market
pub mod fees;

// Privacy plan primitives
pub mod privacy;

// Rug detection laws
pub mod rug;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error taxonomy
pub mod errors;

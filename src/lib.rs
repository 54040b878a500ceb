//! Stochastic compartmental epidemic simulation and calibration.
//!
//! A model is a set of population classes (compartments) connected by events that move members
//! between them at rates drawn from parameters. Time advances in fixed steps of length `Δt`:
//! at every step each class sends members along its events using competing-risk binomial draws,
//! interventions switch on and off according to their decision rules, and costs and health
//! outcomes accumulate.
//!
//! The pieces of a run:
//! * A `Model` is loaded from a JSON description, validated once and shared read-only.
//! * An `Epidemic` simulates one trajectory of the model from a seed, owning all of its state
//!   and its random number streams.
//! * `parallel::run_trajectories` simulates many trajectories, sequentially or on worker
//!   threads, and collects their outcomes.
//! * `Calibration` scores trajectories against observed data and ranks them.
//! * `report` writes the results as CSV files.
pub mod calibration;
pub mod class;
pub mod condition;
pub mod epidemic;
pub mod error;
pub mod event;
pub mod execution_stats;
pub mod force_of_infection;
pub mod hashing;
pub mod intervention;
pub mod log;
mod macros;
pub mod model;
pub mod numeric;
pub mod parallel;
pub mod parameter;
pub mod prelude;
pub mod random;
pub mod report;
pub mod runner;
pub mod statistics;
pub mod trajectory;

// Re-exports for models and tests that pick their own streams.
pub use paste;
pub use rand;

pub use crate::calibration::{Calibration, CalibrationTarget, GoodnessOfFit, SimulationResult};
pub use crate::epidemic::{Epidemic, SeedSearch, StopReason, TrajectoryStatus};
pub use crate::error::EpiError;
pub use crate::log::{debug, error, info, trace, warn};
pub use crate::model::{Model, ModelConfig, Settings};
pub use crate::parallel::{run_trajectories, ExecutionMode, RunOptions, RunResults, SeedSchedule};
pub use crate::report::ReportOptions;
pub use crate::statistics::{OutcomeAggregator, SummaryStatistics};
pub use crate::trajectory::TrajectoryOutcome;
pub use crate::{assert_almost_eq, define_rng};

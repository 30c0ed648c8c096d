pub mod selector;
pub mod settings;
pub mod signals;

// Re-export commonly used types
pub use selector::{candidate_instruments, Evaluation, InstrumentSelector, Selection};
pub use settings::{settings_for, InstrumentSettings};
pub use signals::{score, score_breakdown, Direction, ScoreBreakdown, Signal};

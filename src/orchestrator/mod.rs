//! Orchestrator module for the polling pipeline
//! Couples market data, scoring, alerting and session rotation into one loop

pub mod scanner;

// Re-export main loop types
pub use scanner::{
    command_channel, system_clock, Clock, CommandReply, ControlCommand, CycleOutcome, RunState,
    ScanError, ScanHandle, Scanner, StatusReport,
};

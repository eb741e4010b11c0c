// Simulator error kinds. These surface across the RPC boundary as faults and
// are never caught by the simulator itself.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SimError {
    #[error("simulation has already ended")]
    SimulationEnded,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out-of-order operation: {0}")]
    OrderViolation(String),
    #[error("configuration error: {0}")]
    Config(String),
}

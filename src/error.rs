//! Error kinds for the solver. Only the first three variants are ever
//! threaded through a `Result`; `RegretOverflow`, `ZeroOppReach`, and
//! `ZeroSumResidual` are handled inline at the point of detection (see
//! `vcfr.rs` and `resolver.rs`) and never cross a function boundary as an
//! `Err` — they exist here only so every caller logs them the same way.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("regret overflow at street {street}, nonterminal {nt}")]
    RegretOverflow { street: u8, nt: u32 },

    #[error("zero opponent reach at subgame root (street {street}, board {board})")]
    ZeroOppReach { street: u8, board: u32 },

    #[error("zero-sum residual {residual:e} exceeds tolerance for pot {pot}")]
    ZeroSumResidual { residual: f64, pot: f64 },
}

pub type Result<T> = std::result::Result<T, SolverError>;

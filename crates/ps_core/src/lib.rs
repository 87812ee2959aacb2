//! ps_core: Core types, tokens, rounding, configuration and adapter traits.
//!
//! This crate is **I/O-free**. It defines stable types/APIs used across the
//! engine (`ps_io`, `ps_algo`, `ps_pipeline`, `ps_cli`).
//!
//! - Tokens: `UnitNumber`, `PlotName`, `GroupName`, `GroupKey`, `PrimaryLink`
//! - Entities: `SpatialUnit`, `AdjacentRoom`, `Metrics`, `MetricField`, `RoomShare`
//! - Rounding: away-from-zero helpers, resolution steps, unit conversion
//! - Configuration: `Params` with safe defaults and domain validation
//! - Deterministic (insertion-order) containers
//! - Host adapter traits (`RecordSource`, `MetricSink`)
//!
//! Serialization derives are gated behind the `serde` feature.

#![forbid(unsafe_code)]

pub mod errors {
    use core::fmt;

    /// Minimal error set for core-domain validation & parsing.
    #[derive(Clone, Debug, Eq, PartialEq)]
    pub enum CoreError {
        InvalidToken(String),
        InvalidGroupKey(String),
        InvalidCategory(String),
        InvalidLocation(String),
        DomainOutOfRange(&'static str),
    }

    impl fmt::Display for CoreError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                CoreError::InvalidToken(s) => write!(f, "invalid token: {s:?}"),
                CoreError::InvalidGroupKey(s) => write!(f, "invalid group key: {s:?}"),
                CoreError::InvalidCategory(s) => write!(f, "invalid category: {s:?}"),
                CoreError::InvalidLocation(s) => write!(f, "invalid location: {s:?}"),
                CoreError::DomainOutOfRange(k) => write!(f, "domain out of range: {k}"),
            }
        }
    }

    impl std::error::Error for CoreError {}
}

pub mod adapter;
pub mod determinism;
pub mod entities;
pub mod ids;
pub mod rounding;
pub mod variables;

pub use errors::CoreError;

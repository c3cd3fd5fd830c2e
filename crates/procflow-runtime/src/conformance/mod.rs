//! Online conformance checking.
//!
//! Each checker is a [`Mapper`](crate::mapper::Mapper) over case events and
//! keeps its per-case state in a bounded [`CaseCache`](crate::case_cache::CaseCache):
//!
//! - [`behavioral`]: conformance, completeness and confidence against a
//!   reference model `(B, P, F)`, plus a builder that derives the model
//!   from a training stream
//! - [`soft`]: probabilistic replay against a normalized PDFA
//! - [`temporal`]: per-event deviations from a temporal profile

pub mod behavioral;
pub mod soft;
pub mod temporal;

pub use behavioral::{BehavioralChecker, ConformanceStatus, ReferenceBuilder, UNDEFINED};
pub use soft::{SoftConfig, SoftConformance, SoftReport, SoftStatus};
pub use temporal::{TemporalChecker, TemporalConfig, TemporalDiagnostic};

//! # Procflow Core
//!
//! Foundational types for the procflow streaming process-mining engine.
//!
//! This crate holds everything that does not depend on a streaming runtime:
//!
//! - **Events**: simple (case-centric) events and object-centric events (OCEs)
//! - **Attribute values**: the payload carried by events
//! - **Errors**: the [`MiningError`] kinds shared by every component
//! - **Models**: directly-follows graphs, heuristics nets, object-centric DFGs,
//!   activity-entity-relationship models, behavioral reference models, Petri
//!   nets, probabilistic automata and temporal profiles
//!
//! ## Quick Start
//!
//! ```rust
//! use procflow_core::{Dfg, HeuristicsNet, HeuristicsThresholds};
//!
//! let mut dfg = Dfg::new();
//! dfg.add("A", "B", 2);
//! dfg.add("B", "C", 1);
//!
//! let net = HeuristicsNet::from_dfg(&dfg, HeuristicsThresholds::default(), 0);
//! assert!(net.contains_edge("A", "B"));
//! assert_eq!(dfg.start_activities().len(), 1);
//! ```
//!
//! ## Modules
//!
//! - [`event`]: [`Event`], [`ObjectCentricEvent`] and the [`CaseEvent`] view
//! - [`dfg`]: [`Dfg`] and the [`HeuristicsNet`] derived from it
//! - [`ocdfg`]: the merged object-centric DFG
//! - [`aer`]: activity-entity-relationship model and cardinalities
//! - [`reference`]: the behavioral reference model `(B, P, F)`
//! - [`petri`]: Petri nets and their directly-follows translation
//! - [`pdfa`]: probabilistic deterministic finite automata
//! - [`temporal`]: temporal profiles

pub mod aer;
pub mod dfg;
pub mod error;
pub mod event;
pub mod ocdfg;
pub mod pdfa;
pub mod petri;
pub mod reference;
pub mod serde_pairs;
pub mod temporal;
pub mod value;

pub use aer::{AerModel, Cardinality};
pub use dfg::{ActivityPair, Dfg, HeuristicsEdge, HeuristicsNet, HeuristicsThresholds, SplitKind};
pub use error::{ErrorKind, MiningError, Result};
pub use event::{CaseEvent, Event, FxIndexMap, ObjectCentricEvent, ObjectMap, SharedEvent};
pub use ocdfg::Ocdfg;
pub use pdfa::Pdfa;
pub use petri::PetriNet;
pub use reference::{PathBounds, ReferenceModel, ReferenceModelBuilder};
pub use temporal::{PairStatistics, TemporalProfile};
pub use value::AttributeValue;

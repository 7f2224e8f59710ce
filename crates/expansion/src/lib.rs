//! # Context Expansion
//!
//! Grows context windows around the most query-relevant units of a document and
//! arbitrates between windows that compete for the same units.
//!
//! ## Features
//!
//! - **Versioned candidates** - every window keeps the states it went through
//! - **Round-based arbitration** - priority-ordered growth with conflict resolution
//! - **Cluster passes** - evaluate, deduplicate, filter, merge and rerank candidates
//! - **Retrieval** - admit unit groups by centroid similarity to the query
//!
//! ## Architecture
//!
//! ```text
//! Clustering[] + query vector
//!     │
//!     ├──> Retrieval (top-k / threshold)
//!     │      └─ CandidateCluster per admitted group
//!     │
//!     ├──> Evaluate (one batched oracle call)
//!     │      └─ Candidate per unit, seeded with its own score
//!     │
//!     ├──> Arbitration (round by round)
//!     │      ├─ Grow left / right / both, keep the best density
//!     │      ├─ Resolve conflicts against this round's OwnershipMap
//!     │      ├─ Push lower-priority holders off claimed units
//!     │      └─ RoundSnapshot per round until nothing grows
//!     │
//!     └──> Filter + Merge
//!            └─ Non-overlapping, ranked windows
//! ```
//!
//! ## Example
//!
//! ```rust
//! use context_chain::{Document, Unit};
//! use context_expansion::{expand_cluster, ArbitrationConfig, CandidateCluster, Evaluator};
//!
//! let doc = Document::from_texts(0, ["a b ", "c d ", "e f "]).unwrap();
//! let evaluator = Evaluator::new("query", |_: &str, units: &[Unit]| -> f32 {
//!     units.iter().map(|u| if u.index == 2 { 0.0 } else { 1.0 }).sum()
//! });
//!
//! let mut cluster = CandidateCluster::new(0, 0, vec![0], 1.0);
//! cluster.evaluate(&doc, &evaluator).unwrap();
//! let result = expand_cluster(&mut cluster, &doc, &evaluator, &ArbitrationConfig::default()).unwrap();
//! assert!(result.converged);
//! assert_eq!(result.entries[0].text, "a b  c d ");
//! ```

mod candidate;
mod cluster;
mod config;
mod engine;
mod error;
mod oracle;
mod ownership;
mod retrieval;
mod snapshot;
mod state;

pub use candidate::{Candidate, OptimizeOptions, Selection, DEFAULT_THRESHOLD};
pub use cluster::CandidateCluster;
pub use config::{ArbitrationConfig, ExpansionConfig, RetrievalMethod, SelectionPolicy};
pub use engine::{
    expand_cluster, refine_cluster, run_round, ContextExpansion, Resolution, RoundOutcome,
};
pub use error::{ExpansionError, Result};
pub use oracle::{joined_text, Evaluator, RelevanceOracle};
pub use ownership::OwnershipMap;
pub use retrieval::retrieve_clusters;
pub use snapshot::{RoundSnapshot, SnapshotEntry};
pub use state::{round_density, Growth, GrowthAction, State};

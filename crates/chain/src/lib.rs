//! # Context Chain
//!
//! Ordered content units of a document, the spans that cover them, and the labelled unit
//! groups that context expansion starts from.
//!
//! ## Architecture
//!
//! ```text
//! Document (Unit[] with contiguous indices)
//!     │
//!     ├──> Unit Sequence
//!     │      ├─ index lookup
//!     │      ├─ left/right neighbors (truncated at boundaries)
//!     │      └─ span text + word counts
//!     │
//!     └──> Clustering (external labels)
//!            ├─ UnitCluster per label (outliers = -1)
//!            └─ Centroid pooling (average / max) for retrieval
//! ```
//!
//! ## Example
//!
//! ```rust
//! use context_chain::{Direction, Document, UnitSpan};
//!
//! let doc = Document::from_texts(0, ["One. ", "Two. ", "Three. "]).unwrap();
//! let grown = doc.extend(UnitSpan::single(1), Direction::Right, 5).unwrap();
//! assert_eq!(grown, UnitSpan::new(1, 2));
//! assert_eq!(doc.text(grown, "").unwrap(), "Two. Three. ");
//! ```

mod cluster;
mod document;
mod error;
mod similarity;
mod types;

pub use cluster::{Clustering, UnitCluster, OUTLIER_LABEL};
pub use document::Document;
pub use error::{ChainError, Result};
pub use similarity::{cosine_similarity, normalized, pool, Pooling};
pub use types::{Direction, Unit, UnitSpan};

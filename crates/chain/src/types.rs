use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// An atomic content element of a document (typically a group of sentences)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    /// Position within the document (0-indexed, contiguous)
    pub index: usize,

    /// The unit text, including any trailing whitespace
    pub text: String,

    /// Embedding of the unit, used for centroid pooling and retrieval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl Unit {
    /// Create a unit without an embedding
    #[must_use]
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            vector: None,
        }
    }

    /// Builder: attach an embedding vector
    #[must_use]
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Number of whitespace-separated words
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Side of a unit or span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards lower indices
    Left,
    /// Towards higher indices
    Right,
}

/// Inclusive run of unit indices `[first, last]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitSpan {
    pub first: usize,
    pub last: usize,
}

impl UnitSpan {
    /// Span of a single unit
    #[must_use]
    pub const fn single(index: usize) -> Self {
        Self {
            first: index,
            last: index,
        }
    }

    /// Span from two bounds, in any order
    #[must_use]
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            first: a.min(b),
            last: a.max(b),
        }
    }

    /// Number of units covered
    #[must_use]
    pub const fn len(&self) -> usize {
        self.last - self.first + 1
    }

    /// A span always covers at least one unit
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub const fn contains(&self, index: usize) -> bool {
        index >= self.first && index <= self.last
    }

    /// True when both spans share at least one index
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    /// True when the spans overlap or `other` starts right after `self` (or vice versa)
    #[must_use]
    pub const fn touches(&self, other: &Self) -> bool {
        self.first <= other.last.saturating_add(1) && other.first <= self.last.saturating_add(1)
    }

    /// Smallest span covering both
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            first: self.first.min(other.first),
            last: self.last.max(other.last),
        }
    }

    /// Iterate the covered indices in ascending order
    #[must_use]
    pub const fn indices(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }
}

impl fmt::Display for UnitSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{:03}", self.first)
        } else {
            write!(f, "{:03}-{:03}", self.first, self.last)
        }
    }
}

use crate::error::{ChainError, Result};
use crate::types::{Direction, Unit, UnitSpan};
use serde::{Deserialize, Serialize};

/// Ordered unit sequence of one document
///
/// Units are stored by position; `units[i].index == base + i` is enforced on construction,
/// so index lookups and neighbor fetches are plain slice arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Document identifier
    pub id: u32,

    units: Vec<Unit>,
}

impl Document {
    /// Build a document, validating that unit indices form one ascending run
    pub fn new(id: u32, units: Vec<Unit>) -> Result<Self> {
        let Some(first) = units.first() else {
            return Err(ChainError::EmptyDocument);
        };

        let base = first.index;
        for (offset, unit) in units.iter().enumerate() {
            let expected = base + offset;
            if unit.index != expected {
                return Err(ChainError::NonContiguous {
                    expected,
                    found: unit.index,
                });
            }
        }

        Ok(Self { id, units })
    }

    /// Build a document from plain texts, indexing units from 0
    pub fn from_texts<I, S>(id: u32, texts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let units = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Unit::new(index, text))
            .collect();
        Self::new(id, units)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Index of the first unit
    #[must_use]
    pub fn first_index(&self) -> usize {
        self.units.first().map_or(0, |u| u.index)
    }

    /// Index of the last unit
    #[must_use]
    pub fn last_index(&self) -> usize {
        self.units.last().map_or(0, |u| u.index)
    }

    fn position(&self, index: usize) -> Option<usize> {
        index
            .checked_sub(self.first_index())
            .filter(|pos| *pos < self.units.len())
    }

    #[must_use]
    pub fn unit(&self, index: usize) -> Option<&Unit> {
        self.position(index).map(|pos| &self.units[pos])
    }

    /// Units covered by `span`
    pub fn slice(&self, span: UnitSpan) -> Result<&[Unit]> {
        let start = self
            .position(span.first)
            .ok_or(ChainError::UnitNotFound(span.first))?;
        let end = self
            .position(span.last)
            .ok_or(ChainError::UnitNotFound(span.last))?;
        Ok(&self.units[start..=end])
    }

    /// Up to `n` units adjacent to `index` on the given side, in document order
    ///
    /// Shorter (possibly empty) at the document boundary.
    pub fn neighbors(&self, index: usize, direction: Direction, n: usize) -> Result<&[Unit]> {
        let pos = self.position(index).ok_or(ChainError::UnitNotFound(index))?;
        let slice = match direction {
            Direction::Left => &self.units[pos.saturating_sub(n)..pos],
            Direction::Right => {
                let end = pos.saturating_add(n).min(self.units.len() - 1);
                &self.units[pos + 1..=end]
            }
        };
        Ok(slice)
    }

    /// Grow `span` by up to `n` units on one side, clamped at the boundary
    pub fn extend(&self, span: UnitSpan, direction: Direction, n: usize) -> Result<UnitSpan> {
        let grown = match direction {
            Direction::Left => {
                let added = self.neighbors(span.first, Direction::Left, n)?.len();
                UnitSpan::new(span.first - added, span.last)
            }
            Direction::Right => {
                let added = self.neighbors(span.last, Direction::Right, n)?.len();
                UnitSpan::new(span.first, span.last + added)
            }
        };
        Ok(grown)
    }

    /// Concatenate the texts of `span` with `separator`
    pub fn text(&self, span: UnitSpan, separator: &str) -> Result<String> {
        Ok(self
            .slice(span)?
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join(separator))
    }

    /// Total whitespace-separated words in `span`
    pub fn word_count(&self, span: UnitSpan) -> Result<usize> {
        Ok(self.slice(span)?.iter().map(Unit::word_count).sum())
    }
}

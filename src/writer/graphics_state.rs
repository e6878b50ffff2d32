//! Extended Graphics State (ExtGState) resources for constant alpha.
//!
//! Opacity cannot be set with a plain content-stream operator, so each
//! distinct alpha level used in a document gets one shared ExtGState
//! dictionary, selected on a page with `/GS<n> gs`.

use crate::error::Result;
use crate::object::Object;
use crate::registry::{CacheEntry, ResourceCache};
use crate::writer::ObjectSink;
use std::collections::HashMap;

/// Fully opaque, in per-mille.
pub const OPAQUE: u16 = 1000;

/// Builder for Extended Graphics State dictionaries.
#[derive(Debug, Clone, Default)]
pub struct ExtGStateBuilder {
    /// Fill alpha (ca) - 0.0 to 1.0
    fill_alpha: Option<f64>,
    /// Stroke alpha (CA) - 0.0 to 1.0
    stroke_alpha: Option<f64>,
}

impl ExtGStateBuilder {
    /// Create a new ExtGState builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set fill alpha (opacity for fill operations).
    pub fn fill_alpha(mut self, alpha: f64) -> Self {
        self.fill_alpha = Some(alpha.clamp(0.0, 1.0));
        self
    }

    /// Set stroke alpha (opacity for stroke operations).
    pub fn stroke_alpha(mut self, alpha: f64) -> Self {
        self.stroke_alpha = Some(alpha.clamp(0.0, 1.0));
        self
    }

    /// Set both fill and stroke alpha to the same value.
    pub fn alpha(self, alpha: f64) -> Self {
        self.fill_alpha(alpha).stroke_alpha(alpha)
    }

    /// Build the ExtGState dictionary.
    pub fn build(&self) -> Object {
        let mut dict = HashMap::new();
        dict.insert("Type".to_string(), Object::Name("ExtGState".to_string()));
        if let Some(ca) = self.stroke_alpha {
            dict.insert("CA".to_string(), Object::Real(ca));
        }
        if let Some(ca) = self.fill_alpha {
            dict.insert("ca".to_string(), Object::Real(ca));
        }
        Object::Dictionary(dict)
    }
}

/// Shared alpha graphics states, keyed by per-mille opacity.
#[derive(Debug, Clone)]
pub struct AlphaStates {
    states: ResourceCache<u16>,
}

impl Default for AlphaStates {
    fn default() -> Self {
        Self::new()
    }
}

impl AlphaStates {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            states: ResourceCache::new("GS"),
        }
    }

    /// The state for `alpha` (clamped to 0..=1000), allocated on first use.
    pub fn select(&mut self, alpha: u16, sink: &mut dyn ObjectSink) -> Result<&CacheEntry<()>> {
        let alpha = alpha.min(OPAQUE);
        let (entry, created) = self.states.lookup_or_insert_with(alpha, sink, || Ok(()))?;
        if created {
            log::trace!("New alpha state {} for {}", entry.name, alpha);
        }
        Ok(entry)
    }

    /// Number of distinct alpha levels.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no alpha level has been used.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Write one ExtGState dictionary per level.
    pub fn flush(self, sink: &mut dyn ObjectSink) -> Result<()> {
        for (alpha, entry) in self.states.into_entries() {
            let state = ExtGStateBuilder::new().alpha(alpha as f64 / 1000.0).build();
            sink.write_object(entry.id, &state)?;
        }
        Ok(())
    }
}

//! Feature selection: the face's feature registry and the per-segment
//! value vector rule programs read.

use rustc_hash::FxHashMap;

use crate::error::ParseError;
use crate::tables::feat::{FeatTable, FeatureDefn, SillTable};

/// The face's view of `Feat` and `Sill`: every feature the font declares,
/// indexed for lookup by id.
#[derive(Debug)]
pub struct FeatureRegistry {
    feat: FeatTable,
    sill: SillTable,
    index_by_id: FxHashMap<u32, usize>,
}

impl FeatureRegistry {
    pub fn new(feat: FeatTable, sill: SillTable) -> FeatureRegistry {
        let index_by_id = feat
            .features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id, i))
            .collect();
        FeatureRegistry {
            feat,
            sill,
            index_by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.feat.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feat.features.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FeatureDefn> {
        self.feat.features.get(index)
    }

    pub fn find_id(&self, id: u32) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    /// The default value vector, with any `Sill` overrides for `lang`
    /// applied. An unknown language falls back to the font-wide defaults.
    pub fn defaults(&self, lang: Option<u32>) -> FeatureVal {
        let mut values: Vec<i16> = self
            .feat
            .features
            .iter()
            .map(FeatureDefn::default_value)
            .collect();
        if let Some(overrides) = lang.and_then(|tag| self.sill.lookup(tag)) {
            for &(feat_id, value) in &overrides.settings {
                if let Some(index) = self.find_id(feat_id) {
                    values[index] = value;
                }
            }
        }
        FeatureVal { values }
    }
}

/// One segment's feature values, ordered by the face's feature indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FeatureVal {
    values: Vec<i16>,
}

impl FeatureVal {
    /// The value at `index`; absent features read as 0.
    pub fn get(&self, index: usize) -> i16 {
        self.values.get(index).copied().unwrap_or(0)
    }

    /// Set the feature with the given id.
    ///
    /// Values outside the feature's declared settings are rejected, matching
    /// the original engine's refusal to pass unvetted values to rules.
    pub fn set_by_id(
        &mut self,
        registry: &FeatureRegistry,
        id: u32,
        value: i16,
    ) -> Result<(), ParseError> {
        let index = registry.find_id(id).ok_or(ParseError::MissingValue)?;
        let defn = registry.get(index).ok_or(ParseError::BadIndex)?;
        if !defn.settings.is_empty() && !defn.permits(value) {
            return Err(ParseError::BadValue);
        }
        self.values[index] = value;
        Ok(())
    }
}

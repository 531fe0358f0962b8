//! Binary reading of the `Feat` and `Sill` tables.
//!
//! `Feat` enumerates the user-visible features a font offers along with
//! their permitted settings and name-table label ids. `Sill` maps language
//! tags to per-language feature defaults.

use crate::binary::read::{ReadBinaryDep, ReadCtxt};
use crate::error::ParseError;
use crate::tables::version_parts;

/// One permitted value of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSetting {
    pub value: i16,
    /// `name` table id of the setting's localised label.
    pub label_id: u16,
}

/// One feature definition.
///
/// Label text lives in the font's `name` table, which an external
/// collaborator owns; the engine hands out label ids only.
#[derive(Debug, Clone)]
pub struct FeatureDefn {
    pub id: u32,
    pub flags: u16,
    pub label_id: u16,
    pub settings: Vec<FeatureSetting>,
}

impl FeatureDefn {
    /// A feature's default is its first declared setting.
    pub fn default_value(&self) -> i16 {
        self.settings.first().map_or(0, |s| s.value)
    }

    /// Whether `value` is one of the declared settings.
    pub fn permits(&self, value: i16) -> bool {
        self.settings.iter().any(|s| s.value == value)
    }
}

#[derive(Debug, Default)]
pub struct FeatTable {
    pub features: Vec<FeatureDefn>,
}

impl<'a> ReadBinaryDep<'a> for FeatTable {
    type Args = ();
    type HostType = FeatTable;

    fn read_dep(ctxt: &mut ReadCtxt<'a>, (): ()) -> Result<FeatTable, ParseError> {
        let table = ctxt.scope();
        let version = ctxt.read_u32be()?;
        let major = version_parts(version).0;
        ctxt.check_version(major == 1 || major == 2)?;
        let num_feat = ctxt.read_u16be()?;
        let _reserved = ctxt.read_u16be()?;
        let _reserved = ctxt.read_u32be()?;

        let mut features = Vec::with_capacity(usize::from(num_feat));
        for _ in 0..num_feat {
            let id = if major >= 2 {
                ctxt.read_u32be()?
            } else {
                u32::from(ctxt.read_u16be()?)
            };
            let num_settings = ctxt.read_u16be()?;
            if major >= 2 {
                let _reserved = ctxt.read_u16be()?;
            }
            let offset = ctxt.read_u32be()?;
            let flags = ctxt.read_u16be()?;
            let label_id = ctxt.read_u16be()?;

            let mut entries = table.offset(usize::try_from(offset)?).ctxt();
            let mut settings = Vec::with_capacity(usize::from(num_settings));
            for _ in 0..num_settings {
                let value = entries.read_i16be()?;
                let label_id = entries.read_u16be()?;
                settings.push(FeatureSetting { value, label_id });
            }

            features.push(FeatureDefn {
                id,
                flags,
                label_id,
                settings,
            });
        }

        Ok(FeatTable { features })
    }
}

impl FeatTable {
    pub fn feature(&self, id: u32) -> Option<&FeatureDefn> {
        self.features.iter().find(|f| f.id == id)
    }
}

/// A language's feature overrides.
#[derive(Debug, Clone)]
pub struct LangFeatures {
    pub tag: u32,
    pub settings: Vec<(u32, i16)>,
}

#[derive(Debug, Default)]
pub struct SillTable {
    /// Sorted by language tag.
    langs: Vec<LangFeatures>,
}

impl<'a> ReadBinaryDep<'a> for SillTable {
    type Args = ();
    type HostType = SillTable;

    fn read_dep(ctxt: &mut ReadCtxt<'a>, (): ()) -> Result<SillTable, ParseError> {
        let table = ctxt.scope();
        let version = ctxt.read_u32be()?;
        ctxt.check_version(version_parts(version).0 == 1)?;
        let num_langs = ctxt.read_u16be()?;
        let _search_range = ctxt.read_u16be()?;
        let _entry_selector = ctxt.read_u16be()?;
        let _range_shift = ctxt.read_u16be()?;

        let mut langs = Vec::with_capacity(usize::from(num_langs));
        for _ in 0..num_langs {
            let tag = ctxt.read_u32be()?;
            let num_settings = ctxt.read_u16be()?;
            let offset = ctxt.read_u16be()?;

            let mut settings = Vec::with_capacity(usize::from(num_settings));
            let mut entries = table.offset(usize::from(offset)).ctxt();
            for _ in 0..num_settings {
                let feat_id = entries.read_u32be()?;
                let value = entries.read_i16be()?;
                let _reserved = entries.read_u16be()?;
                settings.push((feat_id, value));
            }
            langs.push(LangFeatures { tag, settings });
        }
        langs.sort_by_key(|lang| lang.tag);

        Ok(SillTable { langs })
    }
}

impl SillTable {
    pub fn lookup(&self, tag: u32) -> Option<&LangFeatures> {
        self.langs
            .binary_search_by_key(&tag, |lang| lang.tag)
            .ok()
            .map(|i| &self.langs[i])
    }

    pub fn is_empty(&self) -> bool {
        self.langs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::read::ReadScope;

    fn feat_v2(features: &[(u32, &[(i16, u16)], u16, u16)]) -> Vec<u8> {
        let mut data = vec![0, 2, 0, 0];
        data.extend_from_slice(&(features.len() as u16).to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        let mut settings_off = 12 + 16 * features.len() as u32;
        let mut settings_blob = Vec::new();
        for (id, settings, flags, label) in features {
            data.extend_from_slice(&id.to_be_bytes());
            data.extend_from_slice(&(settings.len() as u16).to_be_bytes());
            data.extend_from_slice(&[0, 0]);
            data.extend_from_slice(&settings_off.to_be_bytes());
            data.extend_from_slice(&flags.to_be_bytes());
            data.extend_from_slice(&label.to_be_bytes());
            for (value, label) in *settings {
                settings_blob.extend_from_slice(&value.to_be_bytes());
                settings_blob.extend_from_slice(&label.to_be_bytes());
                settings_off += 4;
            }
        }
        data.extend_from_slice(&settings_blob);
        data
    }

    #[test]
    fn feat_defaults_and_permitted_values() {
        let data = feat_v2(&[
            (crate::tag!(b"kern"), &[(1, 260), (0, 261)], 0, 259),
            (1051, &[(0, 270)], 0, 262),
        ]);
        let feat = ReadScope::new(&data).read::<FeatTable>().unwrap();
        assert_eq!(feat.features.len(), 2);

        let kern = feat.feature(crate::tag!(b"kern")).unwrap();
        assert_eq!(kern.default_value(), 1);
        assert_eq!(kern.label_id, 259);
        assert!(kern.permits(0));
        assert!(!kern.permits(7));

        assert_eq!(feat.feature(1051).unwrap().default_value(), 0);
        assert!(feat.feature(9999).is_none());
    }

    #[test]
    fn sill_lookup() {
        // version, 1 lang, search fields, then one entry with 1 setting
        let mut data = vec![0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
        data.extend_from_slice(&crate::tag!(b"TRK ").to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&20u16.to_be_bytes());
        data.extend_from_slice(&crate::tag!(b"kern").to_be_bytes());
        data.extend_from_slice(&0i16.to_be_bytes());
        data.extend_from_slice(&[0, 0]);

        let sill = ReadScope::new(&data).read::<SillTable>().unwrap();
        let turkish = sill.lookup(crate::tag!(b"TRK ")).unwrap();
        assert_eq!(turkish.settings, vec![(crate::tag!(b"kern"), 0)]);
        assert!(sill.lookup(crate::tag!(b"ENG ")).is_none());
    }
}

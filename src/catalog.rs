//! Technologies, the materials each one offers, and their display colors.
//!
//! Pure data. The first material listed for a technology is its default.

use egui::Color32;
use serde::{Deserialize, Serialize};

use crate::error::SelectionError;

/// Infill values offered by the UI for FDM.
pub const INFILL_PRESETS: [u8; 4] = [20, 40, 60, 80];
/// Infill used for quoting whenever the technology prints solid parts.
pub const FULL_DENSITY: u8 = 100;
pub const MIN_INFILL: u8 = 10;
pub const INFILL_STEP: u8 = 10;
pub const DEFAULT_INFILL: u8 = INFILL_PRESETS[0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "CN")]
    Cn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Technology {
    #[default]
    #[serde(rename = "FDM")]
    Fdm,
    #[serde(rename = "RESIN")]
    Resin,
    #[serde(rename = "SLS")]
    Sls,
}

impl Technology {
    pub const ALL: [Technology; 3] = [Technology::Fdm, Technology::Resin, Technology::Sls];

    pub fn key(self) -> &'static str {
        match self {
            Technology::Fdm => "FDM",
            Technology::Resin => "RESIN",
            Technology::Sls => "SLS",
        }
    }

    pub fn label(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Technology::Fdm, Locale::En) => "FDM (Filament)",
            (Technology::Fdm, Locale::Cn) => "熔融沉积 (FDM)",
            (Technology::Resin, Locale::En) => "Resin (SLA/DLP)",
            (Technology::Resin, Locale::Cn) => "光固化 (SLA/DLP)",
            (Technology::Sls, Locale::En) => "SLS (Powder)",
            (Technology::Sls, Locale::Cn) => "激光烧结 (SLS)",
        }
    }

    /// Materials offered for this technology, default first.
    pub fn materials(self) -> &'static [MaterialId] {
        match self {
            Technology::Fdm => &[MaterialId::Pla, MaterialId::Petg, MaterialId::Abs, MaterialId::Tpu],
            Technology::Resin => &[MaterialId::ResinStd, MaterialId::ResinTough],
            Technology::Sls => &[MaterialId::NylonPa12, MaterialId::NylonGlass],
        }
    }

    pub fn default_material(self) -> MaterialId {
        self.materials()[0]
    }

    pub fn offers(self, material: MaterialId) -> bool {
        self.materials().contains(&material)
    }

    /// Only filament printing has a configurable infill.
    pub fn has_infill(self) -> bool {
        self == Technology::Fdm
    }
}

impl std::fmt::Display for Technology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for Technology {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Technology::ALL
            .into_iter()
            .find(|t| t.key() == s)
            .ok_or_else(|| SelectionError::UnknownTechnology(s.to_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialId {
    #[serde(rename = "PLA")]
    Pla,
    #[serde(rename = "PETG")]
    Petg,
    #[serde(rename = "ABS")]
    Abs,
    #[serde(rename = "TPU")]
    Tpu,
    #[serde(rename = "RESIN_STD")]
    ResinStd,
    #[serde(rename = "RESIN_TOUGH")]
    ResinTough,
    #[serde(rename = "NYLON_PA12")]
    NylonPa12,
    #[serde(rename = "NYLON_GLASS")]
    NylonGlass,
}

impl MaterialId {
    pub const ALL: [MaterialId; 8] = [
        MaterialId::Pla,
        MaterialId::Petg,
        MaterialId::Abs,
        MaterialId::Tpu,
        MaterialId::ResinStd,
        MaterialId::ResinTough,
        MaterialId::NylonPa12,
        MaterialId::NylonGlass,
    ];

    /// Stable id used on the wire.
    pub fn key(self) -> &'static str {
        match self {
            MaterialId::Pla => "PLA",
            MaterialId::Petg => "PETG",
            MaterialId::Abs => "ABS",
            MaterialId::Tpu => "TPU",
            MaterialId::ResinStd => "RESIN_STD",
            MaterialId::ResinTough => "RESIN_TOUGH",
            MaterialId::NylonPa12 => "NYLON_PA12",
            MaterialId::NylonGlass => "NYLON_GLASS",
        }
    }

    pub fn color(self) -> Color32 {
        match self {
            MaterialId::Pla => Color32::from_rgb(0xFF, 0x8C, 0x00),
            MaterialId::Petg => Color32::from_rgb(0x32, 0xCD, 0x32),
            MaterialId::Abs => Color32::from_rgb(0xDC, 0x14, 0x3C),
            MaterialId::Tpu => Color32::from_rgb(0x1E, 0x90, 0xFF),
            MaterialId::ResinStd => Color32::from_rgb(0x80, 0x80, 0x80),
            MaterialId::ResinTough => Color32::from_rgb(0x00, 0xCE, 0xD1),
            MaterialId::NylonPa12 => Color32::from_rgb(0xE3, 0xE3, 0xE3),
            MaterialId::NylonGlass => Color32::from_rgb(0xF9, 0xF9, 0xF9),
        }
    }

    pub fn name(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (MaterialId::Pla, Locale::En) => "PLA (Standard)",
            (MaterialId::Pla, Locale::Cn) => "PLA (标准)",
            (MaterialId::Petg, Locale::En) => "PETG (Durable)",
            (MaterialId::Petg, Locale::Cn) => "PETG (耐用)",
            (MaterialId::Abs, Locale::En) => "ABS (Technical)",
            (MaterialId::Abs, Locale::Cn) => "ABS (工程)",
            (MaterialId::Tpu, Locale::En) => "TPU (Flexible)",
            (MaterialId::Tpu, Locale::Cn) => "TPU (柔性)",
            (MaterialId::ResinStd, Locale::En) => "Standard Resin",
            (MaterialId::ResinStd, Locale::Cn) => "标准树脂",
            (MaterialId::ResinTough, Locale::En) => "Tough Resin",
            (MaterialId::ResinTough, Locale::Cn) => "韧性树脂",
            (MaterialId::NylonPa12, Locale::En) => "Nylon PA12",
            (MaterialId::NylonPa12, Locale::Cn) => "尼龙 PA12",
            (MaterialId::NylonGlass, Locale::En) => "Glass-Filled Nylon",
            (MaterialId::NylonGlass, Locale::Cn) => "玻纤尼龙",
        }
    }
}

impl std::fmt::Display for MaterialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for MaterialId {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MaterialId::ALL
            .into_iter()
            .find(|m| m.key() == s)
            .ok_or_else(|| SelectionError::UnknownMaterial(s.to_owned()))
    }
}

/// One catalog entry as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    pub id: MaterialId,
    pub name: &'static str,
    pub color: Color32,
}

/// Ordered materials for `technology`, localized.
pub fn materials(technology: Technology, locale: Locale) -> Vec<Material> {
    technology
        .materials()
        .iter()
        .map(|&id| Material { id, name: id.name(locale), color: id.color() })
        .collect()
}

/// Whether `percent` is an infill the quote machine accepts.
pub fn is_valid_infill(percent: u8) -> bool {
    (MIN_INFILL..=FULL_DENSITY).contains(&percent) && percent % INFILL_STEP == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn every_technology_has_a_default() {
        for tech in Technology::ALL {
            let list = materials(tech, Locale::En);
            assert!(!list.is_empty());
            assert_eq!(list[0].id, tech.default_material());
        }
    }

    #[test]
    fn materials_belong_to_exactly_one_technology() {
        for m in MaterialId::ALL {
            let owners = Technology::ALL.iter().filter(|t| t.offers(m)).count();
            assert_eq!(owners, 1, "{m} owned by {owners} technologies");
        }
    }

    #[test]
    fn keys_parse_back() {
        assert_eq!("RESIN".parse::<Technology>().unwrap(), Technology::Resin);
        assert_eq!("NYLON_GLASS".parse::<MaterialId>().unwrap(), MaterialId::NylonGlass);
        assert!("WOOD".parse::<MaterialId>().is_err());
        assert!("fdm".parse::<Technology>().is_err());
    }

    #[test]
    fn wire_names_match_keys() {
        let json = serde_json::to_string(&MaterialId::ResinTough).unwrap();
        assert_eq!(json, "\"RESIN_TOUGH\"");
        let tech: Technology = serde_json::from_str("\"SLS\"").unwrap();
        assert_eq!(tech, Technology::Sls);
    }

    #[test]
    fn locale_changes_names_not_colors() {
        let en = materials(Technology::Sls, Locale::En);
        let cn = materials(Technology::Sls, Locale::Cn);
        assert_ne!(en[0].name, cn[0].name);
        assert_eq!(en[0].color, cn[0].color);
    }

    #[test]
    fn infill_domain() {
        for p in INFILL_PRESETS {
            assert!(is_valid_infill(p));
        }
        assert!(is_valid_infill(10));
        assert!(is_valid_infill(100));
        assert!(!is_valid_infill(0));
        assert!(!is_valid_infill(25));
        assert!(!is_valid_infill(110));
    }
}

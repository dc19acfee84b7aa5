//! Font-backed text measurement.
//!
//! Faces are resolved once per CSS font stack through `fontdb` and kept in a
//! process-wide cache. Only the advance tables are retained; non-ASCII text
//! re-parses the face from the stored bytes.

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use ttf_parser::Face;

static MEASURER: Lazy<Mutex<Measurer>> = Lazy::new(|| Mutex::new(Measurer::default()));

/// Width in px of a single line of `text`, or `None` when no system font
/// matches `font_family`.
pub fn measure_text_width(text: &str, font_size: f32, font_family: &str) -> Option<f32> {
    if text.is_empty() || font_size <= 0.0 {
        return Some(0.0);
    }
    let mut measurer = MEASURER.lock().ok()?;
    measurer.measure(text, font_size, font_family)
}

#[derive(Default)]
struct Measurer {
    db: Option<Database>,
    faces: HashMap<String, Option<LoadedFace>>,
}

impl Measurer {
    fn measure(&mut self, text: &str, font_size: f32, font_family: &str) -> Option<f32> {
        let key = family_key(font_family);
        if !self.faces.contains_key(&key) {
            let face = self.load(font_family);
            self.faces.insert(key.clone(), face);
        }
        let face = self.faces.get_mut(&key)?.as_mut()?;
        Some(face.width(&text.replace('\t', "    "), font_size))
    }

    fn load(&mut self, font_family: &str) -> Option<LoadedFace> {
        let db = self.db.get_or_insert_with(|| {
            let mut db = Database::new();
            db.load_system_fonts();
            log::debug!(faces = db.len(); "Loaded system fonts");
            db
        });
        let names = family_names(font_family);
        let families: Vec<Family<'_>> = names.iter().map(FamilyName::as_family).collect();
        let id = db.query(&Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        })?;
        db.with_face_data(id, |data, index| LoadedFace::parse(data.to_vec(), index))
            .flatten()
    }
}

enum FamilyName {
    Generic(Family<'static>),
    Named(String),
}

impl FamilyName {
    fn as_family(&self) -> Family<'_> {
        match self {
            FamilyName::Generic(family) => *family,
            FamilyName::Named(name) => Family::Name(name.as_str()),
        }
    }
}

fn family_names(font_family: &str) -> Vec<FamilyName> {
    let mut out: Vec<FamilyName> = font_family
        .split(',')
        .map(|part| part.trim().trim_matches('"').trim_matches('\''))
        .filter(|raw| !raw.is_empty())
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "serif" => FamilyName::Generic(Family::Serif),
            "sans-serif" | "system-ui" | "-apple-system" | "ui-sans-serif" => {
                FamilyName::Generic(Family::SansSerif)
            }
            "monospace" | "ui-monospace" => FamilyName::Generic(Family::Monospace),
            _ => FamilyName::Named(raw.to_string()),
        })
        .collect();
    if out.is_empty() {
        out.push(FamilyName::Generic(Family::SansSerif));
    }
    out
}

fn family_key(font_family: &str) -> String {
    let trimmed = font_family.trim();
    if trimmed.is_empty() {
        "sans-serif".to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

struct LoadedFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: f32,
    ascii: [u16; 128],
    advances: HashMap<char, Option<u16>>,
}

impl LoadedFace {
    fn parse(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let mut ascii = [0u16; 128];
        for byte in 0u8..128 {
            if let Some(glyph) = face.glyph_index(byte as char) {
                ascii[byte as usize] = face.glyph_hor_advance(glyph).unwrap_or(0);
            }
        }
        let units_per_em = face.units_per_em().max(1) as f32;
        Some(Self {
            data,
            index,
            units_per_em,
            ascii,
            advances: HashMap::new(),
        })
    }

    fn width(&mut self, text: &str, font_size: f32) -> f32 {
        let scale = font_size / self.units_per_em;
        // Missing glyphs fall back to a typical sans-serif advance.
        let fallback = font_size * 0.56;
        let missing: Vec<char> = text
            .chars()
            .filter(|ch| !ch.is_ascii() && !self.advances.contains_key(ch))
            .collect();
        if !missing.is_empty()
            && let Ok(face) = Face::parse(&self.data, self.index)
        {
            for ch in missing {
                let advance = face
                    .glyph_index(ch)
                    .and_then(|glyph| face.glyph_hor_advance(glyph));
                self.advances.insert(ch, advance);
            }
        }
        let mut width = 0.0f32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let advance = if ch.is_ascii() {
                Some(self.ascii[ch as usize]).filter(|a| *a > 0)
            } else {
                self.advances.get(&ch).copied().flatten()
            };
            width += match advance {
                Some(units) => units as f32 * scale,
                None => fallback,
            };
        }
        width.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_zero_width() {
        assert_eq!(measure_text_width("", 16.0, "sans-serif"), Some(0.0));
        assert_eq!(measure_text_width("abc", 0.0, "sans-serif"), Some(0.0));
    }

    #[test]
    fn family_stack_maps_generics() {
        let names = family_names("Inter, 'Segoe UI', system-ui");
        assert_eq!(names.len(), 3);
        assert!(matches!(names[0], FamilyName::Named(ref n) if n == "Inter"));
        assert!(matches!(names[1], FamilyName::Named(ref n) if n == "Segoe UI"));
        assert!(matches!(names[2], FamilyName::Generic(Family::SansSerif)));
        assert!(matches!(family_names(" ")[0], FamilyName::Generic(Family::SansSerif)));
    }

    #[test]
    fn wider_text_measures_wider_when_fonts_exist() {
        if let (Some(short), Some(long)) = (
            measure_text_width("ab", 16.0, "sans-serif"),
            measure_text_width("abababab", 16.0, "sans-serif"),
        ) {
            assert!(long > short);
        }
    }
}

use std::fmt;

use core_geom::Point3D;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Bool,
    Integer,
    Real,
    Point3D,
    Colour,
    Choice,
    String,
    File,
    Dir,
}

/// A single filter parameter. Values are exchanged as strings; `ty`
/// governs how `value` is parsed and validated. `secondary` holds an
/// auxiliary value some property kinds need (e.g. the choice list backing a
/// `Choice` property, encoded as a `\x01`-joined string).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterProperty {
    pub name: String,
    pub ty: PropertyType,
    pub key: u32,
    pub value: String,
    pub help: String,
    pub secondary: Option<String>,
    /// Cosmetic properties mutate cached output in place (colour, point
    /// size, opacity) rather than invalidating the cache.
    pub cosmetic: bool,
}

impl FilterProperty {
    pub fn new(name: impl Into<String>, ty: PropertyType, key: u32, value: impl Into<String>, help: impl Into<String>) -> Self {
        let help = help.into();
        debug_assert!(!help.is_empty(), "every property needs non-empty help text");
        Self { name: name.into(), ty, key, value: value.into(), help, secondary: None, cosmetic: false }
    }

    pub fn cosmetic(mut self) -> Self {
        self.cosmetic = true;
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.secondary = Some(choices.join("\x01"));
        self
    }

    pub fn choices(&self) -> Vec<&str> {
        self.secondary.as_deref().map(|s| s.split('\x01').collect()).unwrap_or_default()
    }

    pub fn parse_bool(&self) -> Option<bool> {
        match self.value.trim() {
            "1" | "true" | "TRUE" | "True" => Some(true),
            "0" | "false" | "FALSE" | "False" => Some(false),
            _ => None,
        }
    }

    pub fn parse_i64(&self) -> Option<i64> {
        self.value.trim().parse().ok()
    }

    pub fn parse_f64(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }

    pub fn parse_point3d(&self) -> Option<Point3D> {
        Point3D::parse(&self.value).ok()
    }

    pub fn validate(&self) -> Result<(), String> {
        let ok = match self.ty {
            PropertyType::Bool => self.parse_bool().is_some(),
            PropertyType::Integer => self.parse_i64().is_some(),
            PropertyType::Real => self.parse_f64().is_some(),
            PropertyType::Point3D => self.parse_point3d().is_some(),
            PropertyType::Colour => parse_colour(&self.value).is_some(),
            PropertyType::Choice => self.choices().iter().any(|c| *c == self.value),
            PropertyType::String | PropertyType::File | PropertyType::Dir => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{:?} property {:?} cannot parse {:?}", self.ty, self.name, self.value))
        }
    }
}

pub fn parse_colour(s: &str) -> Option<(f32, f32, f32, f32)> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let r = parts[0].parse().ok()?;
    let g = parts[1].parse().ok()?;
    let b = parts[2].parse().ok()?;
    let a = if parts.len() == 4 { parts[3].parse().ok()? } else { 1.0 };
    Some((r, g, b, a))
}

/// An ordered group of properties shown together under one heading. Keys
/// must be unique within the group.
#[derive(Debug, Clone, Default)]
pub struct FilterPropGroup {
    pub title: String,
    pub properties: Vec<FilterProperty>,
}

impl FilterPropGroup {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), properties: Vec::new() }
    }

    pub fn push(&mut self, prop: FilterProperty) -> &mut Self {
        debug_assert!(
            self.properties.iter().all(|p| p.key != prop.key),
            "duplicate property key {} in group {:?}",
            prop.key,
            self.title
        );
        self.properties.push(prop);
        self
    }

    pub fn get(&self, key: u32) -> Option<&FilterProperty> {
        self.properties.iter().find(|p| p.key == key)
    }
}

impl fmt::Display for FilterPropGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.title)?;
        for p in &self.properties {
            writeln!(f, "  {} = {}", p.name, p.value)?;
        }
        Ok(())
    }
}

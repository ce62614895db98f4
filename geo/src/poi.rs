use std::collections::HashMap;
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Coordinate;

pub type Tags = HashMap<String, String>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Hospital,
    Police,
    Fire,
    Shelter,
    Unknown,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);

impl Category {
    /// Every category a user may ask for. `Unknown` is never selectable.
    pub const SELECTABLE: [Category; 4] = [
        Category::Hospital,
        Category::Police,
        Category::Fire,
        Category::Shelter,
    ];

    /// First match wins: hospital, police, fire station, then either shelter
    /// tagging convention.
    pub fn classify(tags: &Tags) -> Self {
        let tag = |key: &str| tags.get(key).map(String::as_str);
        match (tag("amenity"), tag("emergency")) {
            (Some("hospital"), _) => Self::Hospital,
            (Some("police"), _) => Self::Police,
            (Some("fire_station"), _) => Self::Fire,
            (_, Some("shelter")) | (Some("shelter"), _) => Self::Shelter,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hospital => "hospital",
            Self::Police => "police",
            Self::Fire => "fire",
            Self::Shelter => "shelter",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a comma separated list such as `hospital,police`.
    pub fn parse_list<T: FromIterator<Category>>(s: &str) -> Result<T, UnknownCategory> {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<Category>)
            .collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hospital" => Ok(Self::Hospital),
            "police" => Ok(Self::Police),
            "fire" | "fire_station" => Ok(Self::Fire),
            "shelter" => Ok(Self::Shelter),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PointOfInterest {
    /// `<element type>/<id>`, unique per data source
    pub id: String,
    pub coord: Coordinate,
    pub category: Category,
    pub name: Option<String>,
    pub tags: Tags,
}

impl PointOfInterest {
    pub fn new(id: String, coord: Coordinate, tags: Tags) -> Self {
        let category = Category::classify(&tags);
        let name = tags.get("name").cloned();
        Self {
            id,
            coord,
            category,
            name,
            tags,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.category.label())
    }
}

impl fmt::Display for PointOfInterest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.display_name(), self.category, self.id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_classify() {
        assert_eq!(Category::classify(&tags(&[("amenity", "hospital")])), Category::Hospital);
        assert_eq!(Category::classify(&tags(&[("amenity", "police")])), Category::Police);
        assert_eq!(Category::classify(&tags(&[("amenity", "fire_station")])), Category::Fire);
        assert_eq!(Category::classify(&tags(&[("emergency", "shelter")])), Category::Shelter);
        assert_eq!(Category::classify(&tags(&[("amenity", "shelter")])), Category::Shelter);
        assert_eq!(Category::classify(&tags(&[("amenity", "restaurant")])), Category::Unknown);
        assert_eq!(Category::classify(&Tags::new()), Category::Unknown);
    }

    #[test]
    fn test_classify_precedence() {
        let t = tags(&[("amenity", "hospital"), ("emergency", "shelter")]);
        assert_eq!(Category::classify(&t), Category::Hospital);
        let t = tags(&[("amenity", "fire_station"), ("emergency", "shelter")]);
        assert_eq!(Category::classify(&t), Category::Fire);
        let t = tags(&[("amenity", "restaurant"), ("emergency", "shelter")]);
        assert_eq!(Category::classify(&t), Category::Shelter);
        let t = tags(&[("amenity", "police"), ("emergency", "yes")]);
        assert_eq!(Category::classify(&t), Category::Police);
    }

    #[test]
    fn test_classify_is_total() {
        let amenities = [None, Some("hospital"), Some("police"), Some("fire_station"), Some("shelter"), Some("bench")];
        let emergencies = [None, Some("shelter"), Some("phone")];
        for amenity in amenities {
            for emergency in emergencies {
                let mut t = Tags::new();
                if let Some(a) = amenity {
                    t.insert("amenity".into(), a.into());
                }
                if let Some(e) = emergency {
                    t.insert("emergency".into(), e.into());
                }
                let first = Category::classify(&t);
                assert_eq!(first, Category::classify(&t));
                let expected = match (amenity, emergency) {
                    (Some("hospital"), _) => Category::Hospital,
                    (Some("police"), _) => Category::Police,
                    (Some("fire_station"), _) => Category::Fire,
                    (Some("shelter"), _) | (_, Some("shelter")) => Category::Shelter,
                    _ => Category::Unknown,
                };
                assert_eq!(first, expected, "{:?} {:?}", amenity, emergency);
            }
        }
    }

    #[test]
    fn test_parse_list() {
        let set: BTreeSet<Category> = Category::parse_list("police, Hospital,,fire_station").unwrap();
        assert_eq!(set, BTreeSet::from([Category::Hospital, Category::Police, Category::Fire]));
        assert!(Category::parse_list::<Vec<Category>>("hospital,unknown").is_err());
        assert!(Category::parse_list::<Vec<Category>>("").unwrap().is_empty());
    }

    #[test]
    fn test_point_takes_name_from_tags() {
        let p = PointOfInterest::new(
            "node/1".to_string(),
            Coordinate { lat: 1.0, lon: 2.0 },
            tags(&[("amenity", "police"), ("name", "Polizeirevier Mitte")]),
        );
        assert_eq!(p.category, Category::Police);
        assert_eq!(p.display_name(), "Polizeirevier Mitte");

        let p = PointOfInterest::new("way/7".to_string(), Coordinate { lat: 1.0, lon: 2.0 }, tags(&[("amenity", "hospital")]));
        assert_eq!(p.name, None);
        assert_eq!(p.display_name(), "hospital");
    }
}

//! Wire types for the dog-adoption API.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dog {
    pub id: String,
    pub img: String,
    pub name: String,
    pub age: u32,
    pub zip_code: String,
    pub breed: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Location {
    pub zip_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub state: String,
    pub county: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DogSearchResponse {
    pub result_ids: Vec<String>,
    pub total: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub prev: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Match {
    #[serde(rename = "match")]
    pub dog_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LocationSearchResponse {
    pub results: Vec<Location>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Breed,
    Name,
    Age,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "breed" => Ok(Self::Breed),
            "name" => Ok(Self::Name),
            "age" => Ok(Self::Age),
            _ => Err(format!("unknown sort field '{}'", s)),
        }
    }
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breed => "breed",
            Self::Name => "name",
            Self::Age => "age",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "a-z" => Ok(Self::Asc),
            "desc" | "z-a" => Ok(Self::Desc),
            _ => Err(format!("unknown sort direction '{}'", s)),
        }
    }
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Query for `GET /dogs/search`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DogSearchParams {
    pub breeds: Vec<String>,
    pub zip_codes: Vec<String>,
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    pub size: Option<u32>,
    pub from: Option<u32>,
    pub sort: Option<SortField>,
    pub sort_direction: Option<SortDirection>,
}

impl DogSearchParams {
    /// Query string pairs in request order. List filters repeat their key.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        for breed in &self.breeds {
            pairs.push(("breeds", breed.clone()));
        }
        for zip in &self.zip_codes {
            pairs.push(("zipCodes", zip.clone()));
        }
        if let Some(min) = self.age_min {
            pairs.push(("ageMin", min.to_string()));
        }
        if let Some(max) = self.age_max {
            pairs.push(("ageMax", max.to_string()));
        }
        if let Some(size) = self.size {
            pairs.push(("size", size.to_string()));
        }
        if let Some(from) = self.from {
            pairs.push(("from", from.to_string()));
        }
        // The server wants both halves or neither
        if let (Some(field), Some(dir)) = (self.sort, self.sort_direction) {
            pairs.push(("sort", format!("{}:{}", field.as_str(), dir.as_str())));
        }
        pairs
    }
}

/// One of the three shapes the server accepts for a bounding box
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GeoBoundingBox {
    Edges {
        top: f64,
        left: f64,
        bottom: f64,
        right: f64,
    },
    // Accepted by the server; the CLI only builds `Edges`
    #[allow(dead_code)]
    BottomLeftTopRight {
        bottom_left: Coordinates,
        top_right: Coordinates,
    },
    #[allow(dead_code)]
    BottomRightTopLeft {
        bottom_right: Coordinates,
        top_left: Coordinates,
    },
}

/// Body for `POST /locations/search`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_bounding_box: Option<GeoBoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<u32>,
}

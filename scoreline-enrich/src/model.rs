//! Domain records flowing through the enrichment pipelines
//!
//! Every intermediate value produced by a stage carries the slot (index
//! within the chunk) of the row it belongs to, so results can be regrouped
//! without relying on container ordering or on caller-maintained fields.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Serialised form of a movie id lookup that found nothing
pub const NO_MATCH_ID: i64 = -1;

/// One caller-supplied row (a movie, or a composer name for music pipelines)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Ordinal position in the caller's dataset. Informational only: stages
    /// place results by slot, never by this field.
    #[serde(skip)]
    pub position: usize,
    /// Title used for name searches
    pub name: String,
    /// Release year, when known
    #[serde(default)]
    pub year: Option<i32>,
    /// Passthrough columns, never interpreted except by name lookups
    #[serde(flatten)]
    pub columns: Map<String, Value>,
}

impl InputRecord {
    pub fn new(position: usize, name: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            position,
            name: name.into(),
            year,
            columns: Map::new(),
        }
    }

    /// Attach a passthrough column
    pub fn with_column(mut self, key: impl Into<String>, value: Value) -> Self {
        self.columns.insert(key.into(), value);
        self
    }

    /// String value of a passthrough column, if present and non-empty
    pub fn column_str(&self, key: &str) -> Option<&str> {
        self.columns
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Number a deserialised row set by its order
    pub fn assign_positions(rows: &mut [InputRecord]) {
        for (position, row) in rows.iter_mut().enumerate() {
            row.position = position;
        }
    }
}

/// Result of an id lookup: a match, or the "searched, nothing found" sentinel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalId<T> {
    Matched(T),
    NoMatch,
}

impl<T> ExternalId<T> {
    pub fn matched(&self) -> Option<&T> {
        match self {
            ExternalId::Matched(id) => Some(id),
            ExternalId::NoMatch => None,
        }
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, ExternalId::NoMatch)
    }
}

impl ExternalId<i64> {
    /// Numeric form with `NO_MATCH_ID` for the sentinel
    pub fn as_sentinel(&self) -> i64 {
        self.matched().copied().unwrap_or(NO_MATCH_ID)
    }
}

/// Id resolved for one input row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId<T> {
    /// Index of the row within its chunk
    pub slot: usize,
    pub id: ExternalId<T>,
}

/// Parent → child link produced by a related-entity stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedEntityRef<P, C> {
    /// Index within the chunk of the row the link belongs to
    pub slot: usize,
    pub parent: P,
    pub child: C,
}

/// Enrichment state of one output slot
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment<T> {
    /// Never attempted, or its chunk gave up
    Pending,
    /// Searched, nothing found
    Missing,
    Found(T),
}

impl<T> Enrichment<T> {
    /// `Found` for `Some`, `Missing` for `None`
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Enrichment::Missing, Enrichment::Found)
    }

    pub fn found(&self) -> Option<&T> {
        match self {
            Enrichment::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Enrichment::Missing)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Enrichment::Pending)
    }
}

impl<T> Enrichment<Vec<T>> {
    /// `Found` for a non-empty list, `Missing` otherwise
    pub fn from_list(values: Vec<T>) -> Self {
        if values.is_empty() {
            Enrichment::Missing
        } else {
            Enrichment::Found(values)
        }
    }
}

/// An input row plus its enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord<T> {
    pub record: InputRecord,
    pub value: Enrichment<T>,
}

impl<T: Serialize> EnrichedRecord<T> {
    /// Flatten into a JSON row with the enrichment under `column`.
    ///
    /// `Missing` becomes `null`; `Pending` leaves the column out entirely.
    pub fn to_row(&self, column: &str) -> serde_json::Result<Value> {
        let mut row = self.record.columns.clone();
        row.insert("name".to_string(), Value::String(self.record.name.clone()));
        row.insert("year".to_string(), serde_json::to_value(self.record.year)?);

        match &self.value {
            Enrichment::Pending => {}
            Enrichment::Missing => {
                row.insert(column.to_string(), Value::Null);
            }
            Enrichment::Found(value) => {
                row.insert(column.to_string(), serde_json::to_value(value)?);
            }
        }

        Ok(Value::Object(row))
    }
}

/// Composer resolved from a movie's crew
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composer {
    pub id: i64,
    pub name: String,
    pub birthday: Option<String>,
    pub gender: Option<i64>,
    pub homepage: Option<String>,
    pub place_of_birth: Option<String>,
    /// Earliest release date among the person's composer credits
    pub first_appearance_in_movie: Option<NaiveDate>,
    /// Movie whose credits listed this composer
    pub movie_id: i64,
}

/// Box office revenue reported by the movie provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Revenue {
    pub movie_id: i64,
    pub amount: i64,
}

/// Track resolved from the music catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Music {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    /// First credited artist of the track
    pub composer_id: String,
    pub popularity: Option<u32>,
    /// Album the track was listed on
    pub album_id: String,
}

/// Best scoring soundtrack album for a movie
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumMatch {
    pub album_id: String,
    pub name: String,
    pub release_date: Option<String>,
    pub score: f64,
}

/// Artist profile from the music catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistProfile {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub followers: Option<u64>,
    pub popularity: Option<u32>,
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Lowest rating the target catalog accepts is anything above this.
pub const RATING_FLOOR: f64 = 0.0;
/// Highest rating the target catalog accepts (inclusive).
pub const RATING_CEIL: f64 = 10.0;

/// One row of the source export: what the user watched and how they rated it.
///
/// Identity is `(title, year)`; the rating is input data only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub title: String,
    #[serde(deserialize_with = "year_from_any")]
    pub year: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<RatingValue>,
}

/// Rating as it appeared in the export: numeric, or free text such as "-".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RatingValue {
    Number(f64),
    Text(String),
}

impl RatingValue {
    /// Numeric value when the export cell parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RatingValue::Number(n) => Some(*n),
            RatingValue::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        }
    }
}

impl MovieRecord {
    pub fn new(title: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            year: year.into(),
            rating: None,
        }
    }

    pub fn with_rating(mut self, rating: RatingValue) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn key(&self) -> (&str, &str) {
        (self.title.as_str(), self.year.as_str())
    }

    /// The rating to submit, if it is numeric and within `(0, 10]`.
    pub fn submittable_rating(&self) -> Option<f64> {
        let value = self.rating.as_ref()?.as_number()?;
        if value.is_finite() && value > RATING_FLOOR && value <= RATING_CEIL {
            Some(value)
        } else {
            None
        }
    }
}

/// Years arrive as `2010` or `"2010"` depending on who wrote the checkpoint.
fn year_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "year must be a string or number, got {other}"
        ))),
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::ApiError;

const NAME_MAX_LEN: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Circle,
    Square,
    Triangle,
}

impl std::fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShapeKind::Circle => "circle",
            ShapeKind::Square => "square",
            ShapeKind::Triangle => "triangle",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ShapeKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "circle" => Ok(ShapeKind::Circle),
            "square" => Ok(ShapeKind::Square),
            "triangle" => Ok(ShapeKind::Triangle),
            _ => Err(ApiError::Validation(
                r#"shape: Shape must be either "circle", "square", or "triangle"."#.into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shape {
    pub id: i64,
    pub name: String,
    pub shape: ShapeKind,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DB row; the kind is stored as TEXT in `shape_type`.
#[derive(Debug, Clone, FromRow)]
pub struct ShapeRow {
    pub id: i64,
    pub name: String,
    pub shape_type: String,
    pub shape_color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ShapeRow> for Shape {
    type Error = anyhow::Error;

    fn try_from(row: ShapeRow) -> Result<Self, Self::Error> {
        let shape = row
            .shape_type
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown shape_type in row {}: {}", row.id, row.shape_type))?;
        Ok(Shape {
            id: row.id,
            name: row.name,
            shape,
            color: row.shape_color,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct CreateShapeRequest {
    pub name: String,
    pub shape: String,
    pub color: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateShapeRequest {
    pub name: Option<String>,
    pub shape: Option<String>,
    pub color: Option<String>,
}

/// A fully validated record ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewShape {
    pub name: String,
    pub shape: ShapeKind,
    pub color: String,
}

/// Validated partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapePatch {
    pub name: Option<String>,
    pub shape: Option<ShapeKind>,
    pub color: Option<String>,
}

impl CreateShapeRequest {
    pub fn validate(self) -> Result<NewShape, ApiError> {
        Ok(NewShape {
            name: validate_name(self.name)?,
            shape: self.shape.parse()?,
            color: validate_color(self.color)?,
        })
    }
}

impl UpdateShapeRequest {
    pub fn validate(self) -> Result<ShapePatch, ApiError> {
        Ok(ShapePatch {
            name: self.name.map(validate_name).transpose()?,
            shape: self.shape.map(|s| s.parse()).transpose()?,
            color: self.color.map(validate_color).transpose()?,
        })
    }
}

impl From<NewShape> for ShapePatch {
    fn from(n: NewShape) -> Self {
        Self {
            name: Some(n.name),
            shape: Some(n.shape),
            color: Some(n.color),
        }
    }
}

/// Letters, digits and spaces only, at most 50 characters.
fn validate_name(name: String) -> Result<String, ApiError> {
    if name.is_empty() {
        return Err(ApiError::Validation("name: This field may not be blank.".into()));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(ApiError::Validation(format!(
            "name: Ensure this field has no more than {NAME_MAX_LEN} characters."
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ') {
        return Err(ApiError::Validation(
            "name: Name should only contain letters, numbers, and spaces.".into(),
        ));
    }
    Ok(name)
}

/// `#RGB` or `#RRGGBB`.
fn validate_color(color: String) -> Result<String, ApiError> {
    let valid = color
        .strip_prefix('#')
        .map(|hex| (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false);
    if !valid {
        return Err(ApiError::Validation(
            "color: Enter a valid hex color code (e.g., #FFFFFF).".into(),
        ));
    }
    Ok(color)
}

use serde::{Deserialize, Serialize};

use super::shape::Shape;

/// One committed mutation of a shape, as pushed to observers.
///
/// Wire form: `{"action":"created","shape":{..}}`, `{"action":"updated","shape":{..}}`
/// or `{"action":"deleted","shape_id":7}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChangeEvent {
    Created { shape: Shape },
    Updated { shape: Shape },
    Deleted { shape_id: i64 },
}

impl ChangeEvent {
    pub fn action(&self) -> &'static str {
        match self {
            ChangeEvent::Created { .. } => "created",
            ChangeEvent::Updated { .. } => "updated",
            ChangeEvent::Deleted { .. } => "deleted",
        }
    }

    pub fn shape_id(&self) -> i64 {
        match self {
            ChangeEvent::Created { shape } | ChangeEvent::Updated { shape } => shape.id,
            ChangeEvent::Deleted { shape_id } => *shape_id,
        }
    }
}

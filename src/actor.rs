use std::fmt;

use serde::{Deserialize, Serialize};

/// Who is asking. Passed explicitly to every gated operation; there is no
/// fallback identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum Actor {
    Admin,
    Faculty { firstname: String, lastname: String },
    Student { rollno: String },
}

impl Actor {
    pub fn can_replace_workspace(&self) -> bool {
        matches!(self, Actor::Admin)
    }

    /// The name classes refer to their instructor by, for faculty.
    pub fn faculty_name(&self) -> Option<String> {
        match self {
            Actor::Faculty {
                firstname,
                lastname,
            } => Some(format!("{} {}", firstname.trim(), lastname.trim())),
            _ => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Admin => f.write_str("admin"),
            Actor::Faculty { .. } => write!(
                f,
                "faculty {}",
                self.faculty_name().unwrap_or_default()
            ),
            Actor::Student { rollno } => write!(f, "student {rollno}"),
        }
    }
}

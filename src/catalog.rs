use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of record collections a workspace holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Students,
    Faculty,
    AcademicYears,
    Settings,
    Classes,
    Attendance,
    InternalMarks,
}

/// Insert order for a full replace. Every entity appears after everything it
/// references; the wipe runs this table backwards.
pub const INSERT_ORDER: [Entity; 7] = [
    Entity::Students,
    Entity::Faculty,
    Entity::AcademicYears,
    Entity::Settings,
    Entity::Classes,
    Entity::Attendance,
    Entity::InternalMarks,
];

/// Members whose presence marks an archive as a bundled snapshot.
pub const BUNDLE_MARKERS: [&str; 4] = [
    "students.json",
    "faculty.json",
    "classes.json",
    "attendance.json",
];

/// Placeholder password stored for faculty rows that arrive without one.
pub const DEFAULT_FACULTY_PASSWORD: &str = "password123";

const STUDENT_COLUMNS: &[&str] = &[
    "id",
    "rollno",
    "firstname",
    "lastname",
    "email",
    "department",
    "year",
    "semester",
    "createdat",
    "updatedat",
];
const FACULTY_COLUMNS: &[&str] = &[
    "id",
    "facultyid",
    "firstname",
    "lastname",
    "email",
    "department",
    "specialization",
    "password",
    "createdat",
    "updatedat",
];
const CLASS_COLUMNS: &[&str] = &[
    "id",
    "code",
    "name",
    "department",
    "semester",
    "faculty",
    "year",
    "credits",
    "max_midsem",
    "max_assignment",
    "max_attendance",
    "is_active",
    "createdat",
    "updatedat",
];
const ATTENDANCE_COLUMNS: &[&str] = &[
    "id",
    "classid",
    "studentid",
    "date",
    "session",
    "status",
    "notes",
    "createdat",
    "updatedat",
];
const INTERNAL_MARK_COLUMNS: &[&str] = &[
    "id",
    "classid",
    "studentid",
    "midsem",
    "assignment",
    "attendance",
    "total",
    "createdat",
    "updatedat",
];
const ACADEMIC_YEAR_COLUMNS: &[&str] = &["id", "year", "startdate", "enddate", "type", "createdat"];
const SETTING_COLUMNS: &[&str] = &["id", "key", "value", "createdat", "updatedat"];

impl Entity {
    pub const ALL: [Entity; 7] = INSERT_ORDER;

    pub fn as_str(self) -> &'static str {
        match self {
            Entity::Students => "students",
            Entity::Faculty => "faculty",
            Entity::AcademicYears => "academic_years",
            Entity::Settings => "settings",
            Entity::Classes => "classes",
            Entity::Attendance => "attendance",
            Entity::InternalMarks => "internal_marks",
        }
    }

    pub fn parse(name: &str) -> Option<Entity> {
        let lowered = name.trim().to_ascii_lowercase();
        Entity::ALL.into_iter().find(|e| e.as_str() == lowered)
    }

    /// Canonical column whitelist, in declaration order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Entity::Students => STUDENT_COLUMNS,
            Entity::Faculty => FACULTY_COLUMNS,
            Entity::Classes => CLASS_COLUMNS,
            Entity::Attendance => ATTENDANCE_COLUMNS,
            Entity::InternalMarks => INTERNAL_MARK_COLUMNS,
            Entity::AcademicYears => ACADEMIC_YEAR_COLUMNS,
            Entity::Settings => SETTING_COLUMNS,
        }
    }

    /// Entities whose rows this entity refers to. `classes.faculty` is a
    /// free-text name match, but it is still ordered after faculty.
    pub fn depends_on(self) -> &'static [Entity] {
        match self {
            Entity::Classes => &[Entity::Faculty],
            Entity::Attendance | Entity::InternalMarks => &[Entity::Classes, Entity::Students],
            Entity::Students | Entity::Faculty | Entity::AcademicYears | Entity::Settings => &[],
        }
    }

    pub fn json_member(self) -> String {
        format!("{}.json", self.as_str())
    }

    /// Archive members tried, in order, when importing per-entity files.
    pub fn candidate_files(self) -> Vec<String> {
        let mut out = vec![self.json_member(), format!("{}.csv", self.as_str())];
        if self == Entity::AcademicYears {
            out.push("years.json".to_string());
        }
        out
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wipe order for a full replace: dependents first.
pub fn wipe_order() -> impl Iterator<Item = Entity> {
    INSERT_ORDER.into_iter().rev()
}

fn position(order: &[Entity], entity: Entity) -> Option<usize> {
    order.iter().position(|e| *e == entity)
}

/// True when every entity in `order` comes after all of its dependencies.
pub fn is_dependency_order(order: &[Entity]) -> bool {
    order.iter().enumerate().all(|(idx, entity)| {
        entity
            .depends_on()
            .iter()
            .all(|dep| position(order, *dep).map(|p| p < idx).unwrap_or(false))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_order_covers_every_entity_once() {
        for entity in Entity::ALL {
            assert_eq!(INSERT_ORDER.iter().filter(|e| **e == entity).count(), 1);
        }
    }

    #[test]
    fn insert_order_respects_dependencies() {
        assert!(is_dependency_order(&INSERT_ORDER));
        let mut broken = INSERT_ORDER;
        broken.swap(0, 4);
        assert!(!is_dependency_order(&broken));
    }

    #[test]
    fn wipe_clears_dependents_before_their_references() {
        let wipe: Vec<Entity> = wipe_order().collect();
        assert_eq!(
            wipe,
            vec![
                Entity::InternalMarks,
                Entity::Attendance,
                Entity::Classes,
                Entity::Settings,
                Entity::AcademicYears,
                Entity::Faculty,
                Entity::Students,
            ]
        );
        for (idx, entity) in wipe.iter().enumerate() {
            for dep in entity.depends_on() {
                let dep_idx = position(&wipe, *dep).expect("dependency is wiped");
                assert!(dep_idx > idx, "{dep} cleared before dependent {entity}");
            }
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Entity::parse("Internal_Marks"), Some(Entity::InternalMarks));
        assert_eq!(Entity::parse(" students "), Some(Entity::Students));
        assert_eq!(Entity::parse("grades"), None);
    }

    #[test]
    fn academic_years_try_legacy_alias_last() {
        assert_eq!(
            Entity::AcademicYears.candidate_files(),
            vec!["academic_years.json", "academic_years.csv", "years.json"]
        );
        assert_eq!(
            Entity::Settings.candidate_files(),
            vec!["settings.json", "settings.csv"]
        );
    }
}

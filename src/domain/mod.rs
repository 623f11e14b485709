//! Entity records kept in sync with the backend.

mod course;
mod material;
mod teacher;

pub use course::{ClassTime, Course, CoursePatch, NewCourse};
pub use material::{NewStudyMaterial, StudyMaterial, StudyMaterialPatch};
pub use teacher::{NewTeacher, Teacher, TeacherPatch};

use serde::{Deserialize, Deserializer};

/// Patch field that can be cleared: absent is `None`, `null` is `Some(None)`.
pub(crate) fn clearable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

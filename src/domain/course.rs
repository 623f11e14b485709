use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::teacher::Teacher;
use crate::cache::{EntityKind, Record};

/// A weekly class slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTime {
  pub day: String,
  pub time: String,
  #[serde(default)]
  pub classroom: String,
}

/// A course as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
  pub id: String,
  pub name: String,
  pub code: String,
  #[serde(default)]
  pub teacher: String,
  #[serde(default)]
  pub teacher_id: Option<String>,
  #[serde(default)]
  pub class_times: Vec<ClassTime>,
  #[serde(default)]
  pub telegram_group: Option<String>,
  #[serde(default)]
  pub blc_link: Option<String>,
  #[serde(default)]
  pub blc_enroll_key: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Fields needed to create a course
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCourse {
  pub name: String,
  pub code: String,
  #[serde(default)]
  pub teacher: String,
  #[serde(default)]
  pub teacher_id: Option<String>,
  #[serde(default)]
  pub class_times: Vec<ClassTime>,
  #[serde(default)]
  pub telegram_group: Option<String>,
  #[serde(default)]
  pub blc_link: Option<String>,
  #[serde(default)]
  pub blc_enroll_key: Option<String>,
}

impl NewCourse {
  /// Fill `teacher` from the selected teacher, if `teacher_id` names a known one.
  ///
  /// An unknown id (including the "other" placeholder) keeps the manually
  /// entered name and is dropped so it never reaches the backend.
  pub fn with_teacher(mut self, teachers: &[Teacher]) -> Self {
    if let Some(id) = self.teacher_id.as_deref() {
      match teachers.iter().find(|t| t.id == id) {
        Some(selected) => self.teacher = selected.name.clone(),
        None => self.teacher_id = None,
      }
    }
    self
  }
}

/// Partial course update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoursePatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub teacher: Option<String>,
  #[serde(
    default,
    deserialize_with = "crate::domain::clearable",
    skip_serializing_if = "Option::is_none"
  )]
  pub teacher_id: Option<Option<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub class_times: Option<Vec<ClassTime>>,
  #[serde(
    default,
    deserialize_with = "crate::domain::clearable",
    skip_serializing_if = "Option::is_none"
  )]
  pub telegram_group: Option<Option<String>>,
  #[serde(
    default,
    deserialize_with = "crate::domain::clearable",
    skip_serializing_if = "Option::is_none"
  )]
  pub blc_link: Option<Option<String>>,
  #[serde(
    default,
    deserialize_with = "crate::domain::clearable",
    skip_serializing_if = "Option::is_none"
  )]
  pub blc_enroll_key: Option<Option<String>>,
}

impl Record for Course {
  type Draft = NewCourse;
  type Patch = CoursePatch;

  fn kind() -> EntityKind {
    EntityKind::Course
  }

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: String, created_at: DateTime<Utc>, draft: NewCourse) -> Self {
    Self {
      id,
      name: draft.name,
      code: draft.code,
      teacher: draft.teacher,
      teacher_id: draft.teacher_id,
      class_times: draft.class_times,
      telegram_group: draft.telegram_group,
      blc_link: draft.blc_link,
      blc_enroll_key: draft.blc_enroll_key,
      created_at,
    }
  }

  fn to_draft(&self) -> NewCourse {
    NewCourse {
      name: self.name.clone(),
      code: self.code.clone(),
      teacher: self.teacher.clone(),
      teacher_id: self.teacher_id.clone(),
      class_times: self.class_times.clone(),
      telegram_group: self.telegram_group.clone(),
      blc_link: self.blc_link.clone(),
      blc_enroll_key: self.blc_enroll_key.clone(),
    }
  }

  fn to_patch(&self) -> CoursePatch {
    CoursePatch {
      name: Some(self.name.clone()),
      code: Some(self.code.clone()),
      teacher: Some(self.teacher.clone()),
      teacher_id: Some(self.teacher_id.clone()),
      class_times: Some(self.class_times.clone()),
      telegram_group: Some(self.telegram_group.clone()),
      blc_link: Some(self.blc_link.clone()),
      blc_enroll_key: Some(self.blc_enroll_key.clone()),
    }
  }

  fn apply(&mut self, patch: &CoursePatch) {
    if let Some(name) = &patch.name {
      self.name = name.clone();
    }
    if let Some(code) = &patch.code {
      self.code = code.clone();
    }
    if let Some(teacher) = &patch.teacher {
      self.teacher = teacher.clone();
    }
    if let Some(teacher_id) = &patch.teacher_id {
      self.teacher_id = teacher_id.clone();
    }
    if let Some(class_times) = &patch.class_times {
      self.class_times = class_times.clone();
    }
    if let Some(telegram_group) = &patch.telegram_group {
      self.telegram_group = telegram_group.clone();
    }
    if let Some(blc_link) = &patch.blc_link {
      self.blc_link = blc_link.clone();
    }
    if let Some(blc_enroll_key) = &patch.blc_enroll_key {
      self.blc_enroll_key = blc_enroll_key.clone();
    }
  }

  fn validate(draft: &NewCourse) -> Result<(), String> {
    if draft.name.trim().is_empty() {
      return Err("Course name is required".to_string());
    }
    if draft.code.trim().is_empty() {
      return Err("Course code is required".to_string());
    }
    if draft.class_times.iter().any(|t| t.time.trim().is_empty()) {
      return Err("Every class time needs a time".to_string());
    }
    Ok(())
  }
}

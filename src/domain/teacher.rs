use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{EntityKind, Record};

/// A teacher and the courses they teach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub phone: Option<String>,
  #[serde(default)]
  pub department: Option<String>,
  #[serde(default)]
  pub course_ids: Vec<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTeacher {
  pub name: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub phone: Option<String>,
  #[serde(default)]
  pub department: Option<String>,
  #[serde(default)]
  pub course_ids: Vec<String>,
}

impl NewTeacher {
  pub fn named(name: &str) -> Self {
    Self {
      name: name.to_string(),
      ..Self::default()
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeacherPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(
    default,
    deserialize_with = "crate::domain::clearable",
    skip_serializing_if = "Option::is_none"
  )]
  pub email: Option<Option<String>>,
  #[serde(
    default,
    deserialize_with = "crate::domain::clearable",
    skip_serializing_if = "Option::is_none"
  )]
  pub phone: Option<Option<String>>,
  #[serde(
    default,
    deserialize_with = "crate::domain::clearable",
    skip_serializing_if = "Option::is_none"
  )]
  pub department: Option<Option<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub course_ids: Option<Vec<String>>,
}

impl Record for Teacher {
  type Draft = NewTeacher;
  type Patch = TeacherPatch;

  fn kind() -> EntityKind {
    EntityKind::Teacher
  }

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: String, created_at: DateTime<Utc>, draft: NewTeacher) -> Self {
    Self {
      id,
      name: draft.name,
      email: draft.email,
      phone: draft.phone,
      department: draft.department,
      course_ids: draft.course_ids,
      created_at,
    }
  }

  fn to_draft(&self) -> NewTeacher {
    NewTeacher {
      name: self.name.clone(),
      email: self.email.clone(),
      phone: self.phone.clone(),
      department: self.department.clone(),
      course_ids: self.course_ids.clone(),
    }
  }

  fn to_patch(&self) -> TeacherPatch {
    TeacherPatch {
      name: Some(self.name.clone()),
      email: Some(self.email.clone()),
      phone: Some(self.phone.clone()),
      department: Some(self.department.clone()),
      course_ids: Some(self.course_ids.clone()),
    }
  }

  fn apply(&mut self, patch: &TeacherPatch) {
    if let Some(name) = &patch.name {
      self.name = name.clone();
    }
    if let Some(email) = &patch.email {
      self.email = email.clone();
    }
    if let Some(phone) = &patch.phone {
      self.phone = phone.clone();
    }
    if let Some(department) = &patch.department {
      self.department = department.clone();
    }
    if let Some(course_ids) = &patch.course_ids {
      self.course_ids = course_ids.clone();
    }
  }

  fn validate(draft: &NewTeacher) -> Result<(), String> {
    if draft.name.trim().is_empty() {
      return Err("Teacher name is required".to_string());
    }
    Ok(())
  }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{EntityKind, Record};

/// Study material attached to a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMaterial {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  pub course_id: String,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub file_urls: Vec<String>,
  #[serde(default)]
  pub original_file_names: Vec<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewStudyMaterial {
  pub title: String,
  #[serde(default)]
  pub description: String,
  pub course_id: String,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub file_urls: Vec<String>,
  #[serde(default)]
  pub original_file_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyMaterialPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub course_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file_urls: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub original_file_names: Option<Vec<String>>,
}

impl Record for StudyMaterial {
  type Draft = NewStudyMaterial;
  type Patch = StudyMaterialPatch;

  fn kind() -> EntityKind {
    EntityKind::StudyMaterial
  }

  fn id(&self) -> &str {
    &self.id
  }

  fn from_draft(id: String, created_at: DateTime<Utc>, draft: NewStudyMaterial) -> Self {
    Self {
      id,
      title: draft.title,
      description: draft.description,
      course_id: draft.course_id,
      category: draft.category,
      file_urls: draft.file_urls,
      original_file_names: draft.original_file_names,
      created_at,
    }
  }

  fn to_draft(&self) -> NewStudyMaterial {
    NewStudyMaterial {
      title: self.title.clone(),
      description: self.description.clone(),
      course_id: self.course_id.clone(),
      category: self.category.clone(),
      file_urls: self.file_urls.clone(),
      original_file_names: self.original_file_names.clone(),
    }
  }

  fn to_patch(&self) -> StudyMaterialPatch {
    StudyMaterialPatch {
      title: Some(self.title.clone()),
      description: Some(self.description.clone()),
      course_id: Some(self.course_id.clone()),
      category: Some(self.category.clone()),
      file_urls: Some(self.file_urls.clone()),
      original_file_names: Some(self.original_file_names.clone()),
    }
  }

  fn apply(&mut self, patch: &StudyMaterialPatch) {
    if let Some(title) = &patch.title {
      self.title = title.clone();
    }
    if let Some(description) = &patch.description {
      self.description = description.clone();
    }
    if let Some(course_id) = &patch.course_id {
      self.course_id = course_id.clone();
    }
    if let Some(category) = &patch.category {
      self.category = category.clone();
    }
    if let Some(urls) = &patch.file_urls {
      self.file_urls = urls.clone();
    }
    if let Some(names) = &patch.original_file_names {
      self.original_file_names = names.clone();
    }
  }

  fn validate(draft: &NewStudyMaterial) -> Result<(), String> {
    if draft.title.trim().is_empty() {
      return Err("Material title is required".to_string());
    }
    if draft.course_id.trim().is_empty() {
      return Err("Material must belong to a course".to_string());
    }
    Ok(())
  }
}

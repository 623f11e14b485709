use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::marker::PhantomData;

use super::client::RestClient;
use super::{MissingRow, RemoteService};
use crate::cache::Record;

/// [`RemoteService`] over a PostgREST table named after the record's kind.
pub struct TableService<T> {
  client: RestClient,
  _record: PhantomData<fn() -> T>,
}

impl<T> Clone for TableService<T> {
  fn clone(&self) -> Self {
    Self {
      client: self.client.clone(),
      _record: PhantomData,
    }
  }
}

impl<T: Record> TableService<T> {
  pub fn new(client: RestClient) -> Self {
    Self {
      client,
      _record: PhantomData,
    }
  }

  fn path() -> String {
    format!("rest/v1/{}", T::kind().table())
  }

  fn id_filter(id: &str) -> [(&'static str, String); 1] {
    [("id", format!("eq.{}", id))]
  }
}

impl<T: Record> RemoteService<T> for TableService<T> {
  async fn fetch_all(&self) -> Result<Vec<T>> {
    let request = self
      .client
      .request(Method::GET, &Self::path())?
      .query(&[("select", "*"), ("order", "created_at.asc")]);

    let records: Vec<T> = self
      .client
      .send_json(request)
      .await
      .map_err(|e| e.wrap_err(format!("Failed to fetch {}", T::kind())))?;

    tracing::debug!(kind = %T::kind(), count = records.len(), "fetched remote records");
    Ok(records)
  }

  async fn create(&self, draft: &T::Draft) -> Result<T> {
    let request = self
      .client
      .request(Method::POST, &Self::path())?
      .header("Prefer", "return=representation")
      .json(draft);

    let rows: Vec<T> = self
      .client
      .send_json(request)
      .await
      .map_err(|e| e.wrap_err(format!("Failed to create {}", T::kind().label())))?;

    rows
      .into_iter()
      .next()
      .ok_or_else(|| eyre!("Backend returned no row for the new {}", T::kind().label()))
  }

  async fn update(&self, id: &str, patch: &T::Patch) -> Result<Option<T>> {
    let request = self
      .client
      .request(Method::PATCH, &Self::path())?
      .query(&Self::id_filter(id))
      .header("Prefer", "return=representation")
      .json(patch);

    let rows: Vec<T> = self
      .client
      .send_json(request)
      .await
      .map_err(|e| e.wrap_err(format!("Failed to update {} {}", T::kind().label(), id)))?;

    match rows.into_iter().next() {
      Some(row) => Ok(Some(row)),
      None => Err(
        MissingRow {
          kind: T::kind(),
          id: id.to_string(),
        }
        .into(),
      ),
    }
  }

  async fn delete(&self, id: &str) -> Result<()> {
    let request = self
      .client
      .request(Method::DELETE, &Self::path())?
      .query(&Self::id_filter(id));

    self
      .client
      .send(request)
      .await
      .map_err(|e| e.wrap_err(format!("Failed to delete {} {}", T::kind().label(), id)))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Course, CoursePatch, NewCourse};
  use crate::remote::is_missing_row;
  use serde_json::json;
  use wiremock::matchers::{body_json, header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn course_row(id: &str, name: &str) -> serde_json::Value {
    json!({
      "id": id,
      "name": name,
      "code": "CSE101",
      "created_at": "2024-03-01T10:00:00Z"
    })
  }

  async fn service(server: &MockServer) -> TableService<Course> {
    TableService::new(RestClient::new(&server.uri(), "anon").unwrap())
  }

  #[tokio::test]
  async fn test_fetch_all_decodes_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/courses"))
      .and(query_param("select", "*"))
      .and(header("authorization", "Bearer anon"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!([course_row("1", "Physics"), course_row("2", "Maths")])),
      )
      .mount(&server)
      .await;

    let courses = service(&server).await.fetch_all().await.unwrap();
    assert_eq!(courses.len(), 2);
    assert_eq!(courses[1].name, "Maths");
  }

  #[tokio::test]
  async fn test_create_posts_draft_and_returns_row() {
    let server = MockServer::start().await;
    let draft = NewCourse {
      name: "Physics".to_string(),
      code: "CSE101".to_string(),
      ..NewCourse::default()
    };
    Mock::given(method("POST"))
      .and(path("/rest/v1/courses"))
      .and(header("prefer", "return=representation"))
      .and(body_json(serde_json::to_value(&draft).unwrap()))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!([course_row("9", "Physics")])))
      .expect(1)
      .mount(&server)
      .await;

    let created = service(&server).await.create(&draft).await.unwrap();
    assert_eq!(created.id, "9");
  }

  #[tokio::test]
  async fn test_update_filters_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
      .and(path("/rest/v1/courses"))
      .and(query_param("id", "eq.7"))
      .and(body_json(json!({ "name": "Renamed" })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([course_row("7", "Renamed")])))
      .mount(&server)
      .await;

    let patch = CoursePatch {
      name: Some("Renamed".to_string()),
      ..CoursePatch::default()
    };
    let updated = service(&server).await.update("7", &patch).await.unwrap();
    assert_eq!(updated.map(|c| c.name), Some("Renamed".to_string()));
  }

  #[tokio::test]
  async fn test_update_of_missing_row_fails() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
      .and(path("/rest/v1/courses"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(&server)
      .await;

    let result = service(&server)
      .await
      .update("nope", &CoursePatch::default())
      .await;
    assert!(is_missing_row(&result.unwrap_err()));
  }

  #[tokio::test]
  async fn test_delete_surfaces_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/rest/v1/courses"))
      .and(query_param("id", "eq.3"))
      .respond_with(
        ResponseTemplate::new(403)
          .set_body_json(json!({ "message": "permission denied for table courses" })),
      )
      .mount(&server)
      .await;

    let err = service(&server).await.delete("3").await.unwrap_err();
    assert!(format!("{:?}", err).contains("permission denied"));
  }
}

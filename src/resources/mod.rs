//! Typed fetchers, one per entity collection. Each call is a thin composition
//! of [`ApiClient`] with a fixed path and payload shape.

use std::marker::PhantomData;
use std::path::Path;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::{decode, ApiClient, RequestBody, RequestOptions};
use crate::error::{ClientError, Result};
use crate::models::{
    Company, Document, Entity, Project, ProjectCreate, Source, SourceFields, Task, TaskCreate, User,
    UserCreate, UserUpdate,
};
use crate::optimistic::Reload;

/// Query parameters for list calls
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub params: Vec<(String, String)>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn include_archived(include: bool) -> Self {
        Self::new().with("include_archived", include)
    }

    fn into_options(self) -> RequestOptions {
        RequestOptions {
            query: self.params,
            ..RequestOptions::default()
        }
    }
}

/// CRUD over one backend collection
#[derive(Debug, Clone)]
pub struct Resource<E> {
    client: ApiClient,
    collection: String,
    list_path: String,
    default_filter: Option<ListFilter>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Resource<E> {
    pub fn new(client: ApiClient, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        Self {
            client,
            list_path: collection.clone(),
            collection,
            default_filter: None,
            _entity: PhantomData,
        }
    }

    /// List from a different path than the collection (e.g. a scoped view)
    pub fn listing_from(mut self, path: impl Into<String>) -> Self {
        self.list_path = path.into();
        self
    }

    /// Filter applied by `list(None)` and by view reloads
    pub fn with_default_filter(mut self, filter: ListFilter) -> Self {
        self.default_filter = Some(filter);
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.collection.trim_end_matches('/'), id)
    }

    pub async fn list(&self, filter: Option<ListFilter>) -> Result<Vec<E>> {
        let filter = filter.or_else(|| self.default_filter.clone()).unwrap_or_default();
        self.client.get_json(&self.list_path, filter.into_options()).await
    }

    pub async fn get(&self, id: &str) -> Result<E> {
        self.client.get_json(&self.item_path(id), RequestOptions::default()).await
    }

    pub async fn create<B: Serialize + Sync>(&self, fields: &B) -> Result<E> {
        self.client
            .send_json(Method::POST, &self.collection, Some(serde_json::to_value(fields)?))
            .await
    }

    /// Partial update; the server answers with the canonical record
    pub async fn update<B: Serialize + Sync>(&self, id: &str, fields: &B) -> Result<E> {
        self.client
            .send_json(Method::PUT, &self.item_path(id), Some(serde_json::to_value(fields)?))
            .await
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.client.send_empty(Method::DELETE, &self.item_path(id), None).await
    }
}

#[async_trait]
impl<E: Entity> Reload<E> for Resource<E> {
    async fn reload(&self) -> Result<Vec<E>> {
        self.list(None).await
    }
}

impl Resource<Project> {
    pub async fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        self.create(&ProjectCreate {
            name: name.to_string(),
            description: description.map(str::to_string),
        })
        .await
    }

    pub async fn set_archived(&self, id: &str, archived: bool) -> Result<Project> {
        self.update(id, &json!({ "is_archived": archived })).await
    }

    pub async fn add_member(&self, id: &str, member_email: &str) -> Result<()> {
        self.client
            .send_empty(
                Method::POST,
                &format!("{}/members", self.item_path(id)),
                Some(json!({ "member_email": member_email })),
            )
            .await
    }

    pub async fn remove_member(&self, id: &str, member_email: &str) -> Result<()> {
        self.client
            .send_empty(
                Method::DELETE,
                &format!("{}/members", self.item_path(id)),
                Some(json!({ "member_email": member_email })),
            )
            .await
    }
}

impl Resource<Task> {
    /// Tasks of one project
    pub async fn list_for_project(&self, project_id: &str) -> Result<Vec<Task>> {
        self.client
            .get_json(&format!("/tasks/project/{}", project_id), RequestOptions::default())
            .await
    }

    pub async fn create_in_project(&self, project_id: &str, task: &TaskCreate) -> Result<Task> {
        self.client
            .send_json(
                Method::POST,
                &format!("/tasks/projects/{}", project_id),
                Some(serde_json::to_value(task)?),
            )
            .await
    }

    pub async fn assign(&self, id: &str, assignee_email: Option<&str>) -> Result<Task> {
        self.update(id, &json!({ "assignee_email": assignee_email })).await
    }

    pub async fn set_status(&self, id: &str, status: &str) -> Result<Task> {
        self.update(id, &json!({ "status": status })).await
    }
}

/// The task list of one project, as a reload source for its view
#[derive(Debug, Clone)]
pub struct ProjectTasks {
    tasks: Resource<Task>,
    project_id: String,
}

impl ProjectTasks {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

#[async_trait]
impl Reload<Task> for ProjectTasks {
    async fn reload(&self) -> Result<Vec<Task>> {
        self.tasks.list_for_project(&self.project_id).await
    }
}

impl Resource<Task> {
    pub fn for_project(&self, project_id: &str) -> ProjectTasks {
        ProjectTasks {
            tasks: self.clone(),
            project_id: project_id.to_string(),
        }
    }
}

impl Resource<User> {
    pub async fn create_user(&self, user: &UserCreate) -> Result<User> {
        self.create(user).await
    }

    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<User> {
        self.update(id, update).await
    }
}

impl Resource<Source> {
    pub async fn update_source(&self, id: &str, fields: &SourceFields) -> Result<Source> {
        if fields.is_empty() {
            return Err(ClientError::Validation {
                status: 400,
                detail: "No update data provided".to_string(),
            });
        }
        self.update(id, fields).await
    }

    /// Bulk-create sources from a CSV with at least `name` and `url` columns
    pub async fn upload_csv(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        if !file_name.ends_with(".csv") {
            return Err(ClientError::Validation {
                status: 400,
                detail: "File must be a CSV.".to_string(),
            });
        }

        let body = RequestBody::Multipart {
            field: "file".to_string(),
            file_name: file_name.to_string(),
            mime: "text/csv".to_string(),
            bytes,
        };
        let path = format!("{}/upload_csv", self.collection.trim_end_matches('/'));
        let response = self.client.request(Method::POST, &path, Some(body), None).await?;
        let value: Value = decode(response).await?;
        Ok(value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Sources uploaded")
            .to_string())
    }

    pub async fn upload_csv_file(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("sources.csv")
            .to_string();
        self.upload_csv(&file_name, bytes).await
    }
}

impl ApiClient {
    pub fn projects(&self) -> Resource<Project> {
        Resource::new(self.clone(), "/projects/")
    }

    pub fn tasks(&self) -> Resource<Task> {
        Resource::new(self.clone(), "/tasks")
    }

    pub fn documents(&self) -> Resource<Document> {
        Resource::new(self.clone(), "/documents/")
    }

    pub fn sources(&self) -> Resource<Source> {
        Resource::new(self.clone(), "/sources/")
    }

    /// Users of the admin's own company
    pub fn company_users(&self) -> Resource<User> {
        Resource::new(self.clone(), "/admin/users").listing_from("/admin/users/company")
    }

    /// Users across every company (superadmin)
    pub fn all_users(&self) -> Resource<User> {
        Resource::new(self.clone(), "/superadmin/users")
    }

    pub fn companies(&self) -> Resource<Company> {
        Resource::new(self.clone(), "/superadmin/companies")
    }

    /// Last `lines` lines of the backend log (superadmin)
    pub async fn system_logs(&self, lines: u32) -> Result<Vec<String>> {
        self.get_json("/superadmin/logs", RequestOptions::default().with_query("lines", lines))
            .await
    }
}

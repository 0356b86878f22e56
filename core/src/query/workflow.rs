//! Reads and writes against the workflow engine, bound to their cache keys.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::binding::{fetcher, typed_fetcher, Query, QueryOptions};
use super::cache::{Fetcher, QueryCache};
use super::key::{keys, KeySegment, QueryKey};
use super::mutation::Mutation;
use crate::client::ApiService;
use crate::error::ApiError;
use crate::request::ApiOptions;
use crate::types::{CompleteTask, Page, ProcessGroup, ProcessInstance, ProcessModel, Task};

/// The catalogue of engine queries and writes, sharing one cache.
#[derive(Clone)]
pub struct WorkflowQueries {
    api: ApiService,
    cache: QueryCache,
}

impl WorkflowQueries {
    pub fn new(api: ApiService, cache: QueryCache) -> Self {
        Self { api, cache }
    }

    pub fn api(&self) -> &ApiService {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Instance listing, filtered through the engine's report metadata.
    pub fn process_instances(
        &self,
        filters: Option<Value>,
        options: QueryOptions,
    ) -> Query<Page<ProcessInstance>> {
        let key = keys::process_instances(filters.as_ref());
        let api = self.api.clone();
        let body = json!({ "report_metadata": filters.unwrap_or_else(|| json!({})) });
        let fetch = fetcher(move || {
            let api = api.clone();
            let body = body.clone();
            async move {
                api.post("/process-instances", Some(body.into()), ApiOptions::default())
                    .await
            }
        });
        Query::new(self.cache.clone(), key, fetch, options)
    }

    /// Gated until `id` is known (and non-zero).
    pub fn process_instance(&self, id: Option<i64>, options: QueryOptions) -> Query<ProcessInstance> {
        let id = id.filter(|id| *id != 0);
        let key = match id {
            Some(id) => keys::process_instance(id),
            None => QueryKey::new(keys::PROCESS_INSTANCE).with(KeySegment::Absent),
        };
        let path = id.map(|id| format!("/process-instances/{id}"));
        self.gated_get(key, path, options)
    }

    pub fn process_models(&self, options: QueryOptions) -> Query<Page<ProcessModel>> {
        self.gated_get(
            keys::process_models(),
            Some("/process-models".to_string()),
            options,
        )
    }

    /// Gated until `id` is known. Slashes in the id are path segments.
    pub fn process_model(&self, id: Option<&str>, options: QueryOptions) -> Query<ProcessModel> {
        let id = id.unwrap_or_default();
        let path = (!id.is_empty()).then(|| format!("/process-models/{id}"));
        self.gated_get(keys::process_model(id), path, options)
    }

    pub fn process_groups(&self, options: QueryOptions) -> Query<Page<ProcessGroup>> {
        self.gated_get(
            keys::process_groups(),
            Some("/process-groups".to_string()),
            options,
        )
    }

    pub fn process_group(&self, id: Option<&str>, options: QueryOptions) -> Query<ProcessGroup> {
        let id = id.unwrap_or_default();
        let path = (!id.is_empty()).then(|| format!("/process-groups/{id}"));
        self.gated_get(keys::process_group(id), path, options)
    }

    pub fn tasks(&self, options: QueryOptions) -> Query<Page<Task>> {
        self.gated_get(keys::tasks(), Some("/tasks".to_string()), options)
    }

    /// Bind an arbitrary call to `key`.
    pub fn use_api<T, F, Fut>(&self, key: QueryKey, api_call: F, options: QueryOptions) -> Query<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Query::new(self.cache.clone(), key, typed_fetcher(api_call), options)
    }

    /// Start an instance of a process model; stales every instance listing.
    pub fn start_process_instance(&self) -> Mutation<String, ProcessInstance> {
        let api = self.api.clone();
        Mutation::new(
            self.cache.clone(),
            move |process_model_id: String| {
                let api = api.clone();
                async move {
                    let path = format!("/process-models/{process_model_id}/process-instances");
                    api.post(&path, None, ApiOptions::default()).await
                }
            },
            |_| vec![keys::process_instance_lists()],
        )
    }

    /// Submit a task's form; stales the instance and the task list.
    pub fn complete_task(&self) -> Mutation<CompleteTask, Task> {
        let api = self.api.clone();
        Mutation::new(
            self.cache.clone(),
            move |input: CompleteTask| {
                let api = api.clone();
                async move {
                    let path = format!(
                        "/process-instances/{}/tasks/{}",
                        input.process_instance_id, input.task_id
                    );
                    api.put(&path, Some(input.form_data.into()), ApiOptions::default())
                        .await
                }
            },
            |input: &CompleteTask| {
                vec![
                    keys::process_instance(input.process_instance_id),
                    keys::tasks(),
                ]
            },
        )
    }

    fn gated_get<T: DeserializeOwned>(
        &self,
        key: QueryKey,
        path: Option<String>,
        options: QueryOptions,
    ) -> Query<T> {
        let enabled = options.enabled && path.is_some();
        let fetch = self.get_fetcher(path.unwrap_or_default());
        Query::new(
            self.cache.clone(),
            key,
            fetch,
            QueryOptions { enabled, ..options },
        )
    }

    fn get_fetcher(&self, path: String) -> Fetcher {
        let api = self.api.clone();
        fetcher(move || {
            let api = api.clone();
            let path = path.clone();
            async move { api.get(&path, ApiOptions::default()).await }
        })
    }
}

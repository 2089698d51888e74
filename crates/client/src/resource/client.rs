//! The fetch pipeline: validate, look up, fetch, persist, classify.

use std::sync::Arc;
use std::time::Duration;

use rescache_core::{CacheDb, Error, Method, NewResource, RequestDescriptor, ResourceRecord};
use serde_json::{Map, Value};

use super::status::raise_for_status;
use super::{Resource, ResourceKind};
use crate::fetch::{RawResponse, Transport};

/// Runs requests for resources against the store and an injected transport.
///
/// A request whose identity already has a successful record is answered
/// from the store without touching the network. Failed records never
/// short-circuit a new attempt.
#[derive(Clone)]
pub struct ResourceClient {
    db: CacheDb,
    transport: Arc<dyn Transport>,
    deadline: Option<Duration>,
}

impl ResourceClient {
    pub fn new(db: CacheDb, transport: Arc<dyn Transport>) -> Self {
        Self { db, transport, deadline: None }
    }

    /// Bound every network call by `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub async fn get<K: ResourceKind>(
        &self, resource: &Resource<K>, args: Vec<Value>, kwargs: Map<String, Value>,
    ) -> Result<ResourceRecord, Error> {
        self.send(resource, Method::Get, args, kwargs).await
    }

    pub async fn post<K: ResourceKind>(
        &self, resource: &Resource<K>, args: Vec<Value>, kwargs: Map<String, Value>,
    ) -> Result<ResourceRecord, Error> {
        self.send(resource, Method::Post, args, kwargs).await
    }

    /// Build a request from caller input and send it.
    pub async fn send<K: ResourceKind>(
        &self, resource: &Resource<K>, method: Method, args: Vec<Value>, kwargs: Map<String, Value>,
    ) -> Result<ResourceRecord, Error> {
        let request = resource.build_request(method, args, kwargs)?;
        self.send_request(resource, request).await
    }

    /// Send an already built request, e.g. one taken from a stored record.
    ///
    /// The record is stored without auth parameters. Timeouts and transport
    /// failures store nothing. 4xx and 5xx outcomes are stored and then
    /// returned as `ClientError` / `ServerError`.
    pub async fn send_request<K: ResourceKind>(
        &self, resource: &Resource<K>, request: RequestDescriptor,
    ) -> Result<ResourceRecord, Error> {
        resource.validate_request(&request)?;

        let stored = resource.without_auth(&request)?;
        let identity = resource.identity(&stored)?;

        if let Some(record) = self.db.successful_resource(resource.name(), &identity).await? {
            tracing::debug!(kind = resource.name(), id = record.id, %identity, "cache hit");
            return Ok(record);
        }
        tracing::debug!(kind = resource.name(), %identity, "cache miss");

        let response = self.fetch(&resource.with_auth(&stored)?).await?;

        let (record, _) = self
            .db
            .record_resource(NewResource {
                kind: resource.name().to_string(),
                identity,
                config: resource.config().as_map().clone(),
                request: stored,
                head: response.headers,
                body: response.body,
                status: response.status,
            })
            .await?;

        raise_for_status(record)
    }

    /// Fetch the page following `record`, if there is one.
    pub async fn next<K: ResourceKind>(
        &self, resource: &Resource<K>, record: &ResourceRecord,
    ) -> Result<Option<ResourceRecord>, Error> {
        match resource.next_request(&record.request, record)? {
            Some(request) => self.send_request(resource, request).await.map(Some),
            None => Ok(None),
        }
    }

    /// The most recent stored outcome for `request`, without fetching.
    pub async fn latest<K: ResourceKind>(
        &self, resource: &Resource<K>, request: &RequestDescriptor,
    ) -> Result<ResourceRecord, Error> {
        let identity = resource.identity(request)?;
        self.db
            .latest_resource(resource.name(), &identity)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {identity}", resource.name())))
    }

    async fn fetch(&self, request: &RequestDescriptor) -> Result<RawResponse, Error> {
        let send = self.transport.send(request);
        let response = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, send)
                .await
                .map_err(|_| Error::Timeout(format!("fetch exceeded {}ms", deadline.as_millis())))??,
            None => send.await?,
        };
        tracing::debug!(status = response.status, fetch_ms = response.fetch_ms, "fetched");
        Ok(response)
    }
}

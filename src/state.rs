use crate::models::{OperationKind, ProvisionRequest};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("instance {0} already exists")]
    InstanceAlreadyExists(String),
    #[error("instance {0} not found")]
    InstanceNotFound(String),
}

/// A finished provisioning job. Serialized as the `result` of a job lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    #[serde(skip)]
    pub id: String,
    pub operation: OperationKind,
    pub instance_name: String,
    pub success: bool,
    pub output: String,
    pub duration: f64,
}

impl Job {
    fn finished(operation: OperationKind, instance_name: &str, output: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation,
            instance_name: instance_name.to_string(),
            success: true,
            output,
            duration: 0.0,
        }
    }
}

/// In-memory stand-in for the provisioning backend: instances keyed by
/// name, plus a record of every job it has run.
pub struct ProvisionRegistry {
    instances: RwLock<HashMap<String, ProvisionRequest>>,
    jobs: RwLock<HashMap<String, Job>>,
}

impl ProvisionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn create(&self, request: ProvisionRequest) -> Result<Job, RegistryError> {
        let mut instances = self.instances.write().await;

        if instances.contains_key(&request.instance_name) {
            return Err(RegistryError::InstanceAlreadyExists(request.instance_name));
        }

        let job = Job::finished(
            OperationKind::CreateServer,
            &request.instance_name,
            format!(
                "instance {} provisioned for device {}",
                request.instance_name, request.device_id
            ),
        );
        instances.insert(request.instance_name.clone(), request);
        self.jobs.write().await.insert(job.id.clone(), job.clone());

        Ok(job)
    }

    pub async fn destroy(&self, request: ProvisionRequest) -> Result<Job, RegistryError> {
        let mut instances = self.instances.write().await;

        let removed = instances
            .remove(&request.instance_name)
            .ok_or_else(|| RegistryError::InstanceNotFound(request.instance_name.clone()))?;

        let job = Job::finished(
            OperationKind::DestroyServer,
            &removed.instance_name,
            format!("instance {} destroyed", removed.instance_name),
        );
        self.jobs.write().await.insert(job.id.clone(), job.clone());

        Ok(job)
    }

    pub async fn job(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn contains(&self, instance_name: &str) -> bool {
        self.instances.read().await.contains_key(instance_name)
    }
}

impl Default for ProvisionRegistry {
    fn default() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

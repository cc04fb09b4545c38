use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    CreateServer,
    DestroyServer,
}

impl OperationKind {
    /// Path segment of the provisioning endpoint, relative to the base URL.
    pub fn endpoint(&self) -> &'static str {
        match self {
            OperationKind::CreateServer => "create-server",
            OperationKind::DestroyServer => "destroy-server",
        }
    }

    pub fn busy_label(&self) -> &'static str {
        match self {
            OperationKind::CreateServer => "Creating server...",
            OperationKind::DestroyServer => "Destroying server...",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("User is required")]
    MissingUser,
    #[error("Device ID is required")]
    MissingDevice,
    #[error("User and device ID are required")]
    MissingBoth,
}

/// The two operator-supplied fields identifying an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub device: String,
}

impl Identity {
    pub fn new(user: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: device.into(),
        }
    }

    /// Both fields need at least one non-whitespace character.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match (self.user.trim().is_empty(), self.device.trim().is_empty()) {
            (false, false) => Ok(()),
            (true, false) => Err(ValidationError::MissingUser),
            (false, true) => Err(ValidationError::MissingDevice),
            (true, true) => Err(ValidationError::MissingBoth),
        }
    }

    pub fn instance_name(&self) -> String {
        format!("{}-{}", self.user, self.device)
    }
}

/// JSON body posted to both provisioning endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub user: String,
    pub device_id: String,
    pub instance_name: String,
}

impl From<&Identity> for ProvisionRequest {
    fn from(identity: &Identity) -> Self {
        ProvisionRequest {
            user: identity.user.clone(),
            device_id: identity.device.clone(),
            instance_name: identity.instance_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(serde_json::Value::String(detail.into())),
        }
    }
}

/// Reply of `GET /job/{job_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub status: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl JobReport {
    pub fn finished(result: serde_json::Value) -> Self {
        Self {
            status: "finished".to_string(),
            result: Some(result),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: "not_found".to_string(),
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoints() {
        assert_eq!(OperationKind::CreateServer.endpoint(), "create-server");
        assert_eq!(OperationKind::DestroyServer.endpoint(), "destroy-server");
        assert_eq!(OperationKind::DestroyServer.to_string(), "destroy-server");
    }

    #[test]
    fn test_validate_requires_non_whitespace() {
        assert_eq!(Identity::new("alice", "dev1").validate(), Ok(()));
        assert_eq!(
            Identity::new("  ", "dev1").validate(),
            Err(ValidationError::MissingUser)
        );
        assert_eq!(
            Identity::new("alice", "\t\n").validate(),
            Err(ValidationError::MissingDevice)
        );
        assert_eq!(
            Identity::new("", " ").validate(),
            Err(ValidationError::MissingBoth)
        );
    }

    #[test]
    fn test_payload_for_alice() {
        let request = ProvisionRequest::from(&Identity::new("alice", "dev1"));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"user": "alice", "device_id": "dev1", "instance_name": "alice-dev1"})
        );
    }

    #[test]
    fn test_payload_keeps_raw_values() {
        let identity = Identity::new(" bob ", "dev-7 ");
        assert!(identity.validate().is_ok());

        let request = ProvisionRequest::from(&identity);
        assert_eq!(request.user, " bob ");
        assert_eq!(request.device_id, "dev-7 ");
        assert_eq!(request.instance_name, " bob -dev-7 ");
    }

    #[test]
    fn test_api_error_detail_is_optional() {
        let error: ApiError = serde_json::from_str("{}").unwrap();
        assert!(error.detail.is_none());
    }
}

//! facegate-client — HTTP implementation of `facegate_core::BiometricClient`.
//!
//! Talks to the attendance backend's face registration and recognition
//! endpoints. One request per call; retries are the user's decision.

pub mod wire;

use async_trait::async_trait;
use facegate_core::{BiometricClient, ClientError, Descriptor, EnrollResult, VerifyResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use wire::{
    ErrorBody, RecognizeFaceRequest, RecognizeFaceResponse, RegisterFaceRequest,
    RegisterFaceResponse, RECOGNIZE_FACE_PATH, REGISTER_FACE_PATH,
};

/// Connection settings for the backend API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:5000/api`.
    pub base_url: String,
    /// Session token sent as `Authorization: Bearer`.
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            token: None,
            timeout: Duration::from_secs(15),
        }
    }
}

pub struct HttpBiometricClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpBiometricClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            tracing::warn!(%url, status = status.as_u16(), %message, "biometric request failed");
            return Err(if status.is_client_error() {
                ClientError::Rejected(message)
            } else {
                ClientError::Server {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl BiometricClient for HttpBiometricClient {
    #[tracing::instrument(skip(self, descriptor), fields(dim = descriptor.len()))]
    async fn enroll(
        &self,
        subject_id: &str,
        descriptor: &Descriptor,
    ) -> Result<EnrollResult, ClientError> {
        let body = RegisterFaceRequest {
            employee_id: subject_id,
            face_data: descriptor.values(),
        };
        let resp: RegisterFaceResponse = self.post(REGISTER_FACE_PATH, &body).await?;
        if !resp.success {
            return Err(ClientError::Rejected(
                resp.message
                    .unwrap_or_else(|| "face registration failed".to_string()),
            ));
        }
        tracing::debug!("face registration accepted");
        Ok(EnrollResult {
            message: resp.message,
        })
    }

    #[tracing::instrument(skip(self, descriptor), fields(dim = descriptor.len()))]
    async fn verify(&self, descriptor: &Descriptor) -> Result<VerifyResult, ClientError> {
        let body = RecognizeFaceRequest {
            face_data: descriptor.values(),
        };
        let resp: RecognizeFaceResponse = self.post(RECOGNIZE_FACE_PATH, &body).await?;
        if !resp.success {
            return Err(ClientError::Rejected(
                resp.message
                    .unwrap_or_else(|| "face recognition failed".to_string()),
            ));
        }
        tracing::debug!(matched = resp.matched, "face recognition answered");

        let (subject_id, display_name) = match resp.employee {
            Some(employee) => {
                let name = employee.display_name();
                (Some(employee.id), name)
            }
            None => (None, None),
        };
        Ok(VerifyResult {
            matched: resp.matched,
            subject_id,
            display_name,
            message: resp.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn descriptor() -> Descriptor {
        Descriptor::new(vec![0.5, -0.25, 1.0])
    }

    fn client_for(server: &MockServer, token: Option<&str>) -> HttpBiometricClient {
        HttpBiometricClient::new(&ClientConfig {
            base_url: format!("{}/api/", server.uri()),
            token: token.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_enroll_posts_employee_and_face_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/biometric/register-face"))
            .and(header("authorization", "Bearer s3cret"))
            .and(body_json(json!({
                "employeeId": "emp-11",
                "faceData": [0.5, -0.25, 1.0]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "Face registered successfully"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server, Some("s3cret"))
            .enroll("emp-11", &descriptor())
            .await
            .unwrap();
        assert_eq!(
            result.message.as_deref(),
            Some("Face registered successfully")
        );
    }

    #[tokio::test]
    async fn test_enroll_success_false_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/biometric/register-face"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "Employee not found"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .enroll("missing", &descriptor())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(ref m) if m == "Employee not found"));
    }

    #[tokio::test]
    async fn test_client_error_status_is_rejected_with_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/biometric/register-face"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "message": "Invalid face data" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .enroll("emp-1", &descriptor())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(ref m) if m == "Invalid face data"));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/biometric/recognize-face"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream crashed"))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .verify(&descriptor())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_verify_match_maps_employee() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/biometric/recognize-face"))
            .and(body_json(json!({ "faceData": [0.5, -0.25, 1.0] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "match": true,
                "employee": { "_id": "e42", "firstName": "Grace", "lastName": "Hopper" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server, None).verify(&descriptor()).await.unwrap();
        assert!(result.matched);
        assert_eq!(result.subject_id.as_deref(), Some("e42"));
        assert_eq!(result.display_name.as_deref(), Some("Grace Hopper"));
    }

    #[tokio::test]
    async fn test_verify_no_match_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/biometric/recognize-face"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "match": false,
                "message": "No matching employee found"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server, None).verify(&descriptor()).await.unwrap();
        assert!(!result.matched);
        assert!(result.subject_id.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/biometric/recognize-face"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .verify(&descriptor())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = HttpBiometricClient::new(&ClientConfig {
            base_url: "http://127.0.0.1:1/api".into(),
            token: None,
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        let err = client.verify(&descriptor()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpBiometricClient::new(&ClientConfig {
            base_url: "http://hr.local/api///".into(),
            ..ClientConfig::default()
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://hr.local/api");
    }
}

//! HTTP projection of the health state.
//!
//! `GET <health-path>` answers `{"status": n, "services": {...}}`;
//! `GET <health-path>?service=<name>` answers `{"status": n}`. The response
//! is always `200`: monitors must read the status from the body.

use std::collections::BTreeMap;

use duplex_middleware::types::{json_response, HttpResponse};
use http::StatusCode;
use serde::Serialize;

use crate::server::HealthServer;
use crate::status::{ServingStatus, OVERALL};

/// Query parameter naming one service.
pub const SERVICE_PARAM: &str = "service";

/// Body of a health query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Status of the queried service, or the overall status.
    pub status: ServingStatus,
    /// Status of every checked service, for the overall query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<BTreeMap<String, ServingStatus>>,
}

impl HealthReport {
    /// Serializes the report, degrading to `{"status":2}` if that fails.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode health report");
            format!(r#"{{"status":{}}}"#, ServingStatus::NotServing.as_i32()).into_bytes()
        })
    }
}

impl HealthServer {
    /// Builds the report for one service, or the overall report for `None`
    /// or an empty name.
    ///
    /// The overall status is `SERVING` only if the recorded overall status
    /// and every checked service are.
    pub fn report(&self, service: Option<&str>) -> HealthReport {
        match service.filter(|name| !name.is_empty()) {
            Some(name) => HealthReport {
                status: self.status(name),
                services: None,
            },
            None => {
                let mut overall = self.status(OVERALL);
                let mut services = BTreeMap::new();
                for name in self.services() {
                    let status = self.status(name);
                    if !status.is_serving() {
                        overall = ServingStatus::NotServing;
                    }
                    services.insert(name.to_string(), status);
                }
                HealthReport {
                    status: overall,
                    services: Some(services),
                }
            }
        }
    }

    /// Answers a health query given the raw query string.
    pub fn http_response(&self, query: Option<&str>) -> HttpResponse {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.unwrap_or_default()).unwrap_or_default();
        let service = pairs
            .iter()
            .find(|(key, _)| key == SERVICE_PARAM)
            .map(|(_, value)| value.as_str());
        json_response(StatusCode::OK, self.report(service).to_json_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::checker_fn;
    use crate::error::HealthError;
    use http_body_util::BodyExt;

    fn server() -> HealthServer {
        HealthServer::builder()
            .checker("db", checker_fn(|_ctx| async { Ok(()) }))
            .checker("cache", checker_fn(|_ctx| async { Err(HealthError::failed("down")) }))
            .build()
    }

    async fn body(response: HttpResponse) -> serde_json::Value {
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn overall_report_lists_services() {
        let health = server();
        health.init(ServingStatus::Serving).await.unwrap();
        let json = body(health.http_response(None)).await;
        assert_eq!(json, serde_json::json!({"status": 2, "services": {"cache": 2, "db": 1}}));
        health.close();
    }

    #[tokio::test]
    async fn single_service_report() {
        let health = server();
        health.init(ServingStatus::Serving).await.unwrap();
        assert_eq!(body(health.http_response(Some("service=db"))).await, serde_json::json!({"status": 1}));
        assert_eq!(
            body(health.http_response(Some("service=queue"))).await,
            serde_json::json!({"status": 3})
        );
        health.close();
    }

    #[tokio::test]
    async fn empty_service_is_overall() {
        let health = HealthServer::default();
        let report = health.report(Some(""));
        assert_eq!(report.status, ServingStatus::Serving);
        assert_eq!(report.services, Some(BTreeMap::new()));
        assert_eq!(report.to_json_bytes(), br#"{"status":1,"services":{}}"#.to_vec());
    }
}

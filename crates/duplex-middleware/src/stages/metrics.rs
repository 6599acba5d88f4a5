//! Call metrics.
//!
//! Records `duplex_rpc_*` metrics for RPC calls (labelled by method and code)
//! and `duplex_http_*` metrics for HTTP calls (labelled by verb, path and
//! status). Recording is a no-op until a recorder is installed.

use std::time::Instant;

use duplex_core::BoxFuture;
use duplex_telemetry::metrics::{record_http, record_rpc};

use crate::interceptor::{Interceptor, Next};
use crate::kind::{CallKind, CallStatus};

/// Interceptor recording call counters and latency histograms.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsInterceptor;

impl MetricsInterceptor {
    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<K: CallKind> Interceptor<K> for MetricsInterceptor {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn intercept<'a>(&'a self, input: K::Input, next: Next<'a, K>) -> BoxFuture<'a, K::Output> {
        Box::pin(async move {
            let info = K::describe(&input);
            let start = Instant::now();
            let output = next.run(input).await;
            let elapsed = start.elapsed();

            match K::status(&output) {
                CallStatus::Rpc(code) => record_rpc(&info.method, code.as_str(), elapsed),
                CallStatus::Http(status) => {
                    let verb = info.http_method.as_ref().map_or("", |m| m.as_str());
                    record_http(verb, &info.method, status.as_u16(), elapsed);
                }
            }
            output
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{Http, HttpCall};
    use crate::types::empty_response;
    use bytes::Bytes;
    use http::StatusCode;

    #[tokio::test]
    async fn output_is_untouched() {
        let request = http::Request::get("/users").body(Bytes::new()).unwrap();
        let next = Next::<Http>::handler(|_call: HttpCall| Box::pin(async { empty_response(StatusCode::ACCEPTED) }));
        let response = Interceptor::<Http>::intercept(&MetricsInterceptor, HttpCall::new(request), next).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}

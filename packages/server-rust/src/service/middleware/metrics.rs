//! Metrics middleware.
//!
//! Wraps every operation in an `operation` tracing span and records, through
//! the `metrics` facade:
//!
//! - `wharf_operations_total{operation, outcome}`
//! - `wharf_operation_duration_seconds{operation, outcome}`
//! - `wharf_claimed_messages`, the size of every claim batch returned
//!
//! It sits outermost in the stack, so operations rejected by load shedding
//! or cut off by the timeout layer are counted too (`outcome="overloaded"`,
//! `outcome="timeout"`).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::{Operation, OperationError, OperationResponse};

/// Tower layer recording timing and outcome of each operation.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

fn outcome(result: &Result<OperationResponse, OperationError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(OperationError::Storage(err)) => err.kind().as_str(),
        Err(OperationError::Timeout { .. }) => "timeout",
        Err(OperationError::Overloaded) => "overloaded",
        Err(_) => "error",
    }
}

impl<S> Service<Operation> for MetricsService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let operation = op.name();
        let span = info_span!(
            "operation",
            operation,
            call_id = op.ctx().call_id,
            project = %op.ctx().project_id,
            client = op.ctx().client_id.as_deref(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(op);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();
                let outcome = outcome(&result);

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);
                match &result {
                    Err(OperationError::Overloaded | OperationError::Timeout { .. }) => {
                        tracing::warn!(duration_ms, outcome, "operation rejected");
                    }
                    _ => tracing::debug!(duration_ms, outcome, "operation complete"),
                }

                metrics::counter!("wharf_operations_total", "operation" => operation, "outcome" => outcome)
                    .increment(1);
                metrics::histogram!("wharf_operation_duration_seconds", "operation" => operation, "outcome" => outcome)
                    .record(elapsed.as_secs_f64());
                if let Ok(OperationResponse::Claimed(batch)) = &result {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::histogram!("wharf_claimed_messages").record(batch.messages.len() as f64);
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use parking_lot::Mutex;
    use tower::ServiceExt;
    use wharf_core::StorageError;

    use super::*;
    use crate::service::middleware::testing::{exists_op, Delay};
    use crate::service::middleware::LoadShedLayer;

    #[tokio::test]
    async fn passes_through_response() {
        let svc = MetricsLayer.layer(Delay { delay_ms: 0 });
        let resp = svc.oneshot(exists_op(5000)).await.unwrap();
        assert!(matches!(resp, OperationResponse::Empty));
    }

    #[test]
    fn outcome_labels_follow_error_kinds() {
        assert_eq!(outcome(&Ok(OperationResponse::Empty)), "ok");
        assert_eq!(
            outcome(&Err(StorageError::PoolInUse("p".into()).into())),
            "pool_in_use"
        );
        assert_eq!(outcome(&Err(OperationError::Timeout { timeout_ms: 1 })), "timeout");
        assert_eq!(outcome(&Err(OperationError::Overloaded)), "overloaded");
        assert_eq!(outcome(&Err(OperationError::PoolingDisabled)), "error");
    }

    /// Remembers `name{outcome}` for every counter touched.
    #[derive(Clone, Default)]
    struct CounterLog(Arc<Mutex<Vec<String>>>);

    impl Recorder for CounterLog {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            let outcome = key
                .labels()
                .find(|label| label.key() == "outcome")
                .map_or("", |label| label.value());
            self.0.lock().push(format!("{}{{{outcome}}}", key.name()));
            Counter::noop()
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn shed_operations_are_counted_as_overloaded() {
        let log = CounterLog::default();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let err = metrics::with_local_recorder(&log, || {
            let svc = MetricsLayer.layer(LoadShedLayer::new(0).layer(Delay { delay_ms: 0 }));
            runtime.block_on(svc.oneshot(exists_op(5000)))
        })
        .unwrap_err();

        assert!(matches!(err, OperationError::Overloaded));
        assert_eq!(
            *log.0.lock(),
            ["wharf_operations_total{overloaded}".to_string()]
        );
    }
}

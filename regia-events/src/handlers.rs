use crate::event::{Event, EventCategory};
use async_trait::async_trait;
use regia_core::RegiaResult;
use tracing::info;

/// Subscriber contract. An empty `supported_categories` list means the
/// handler accepts every category.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> RegiaResult<()>;

    fn supported_categories(&self) -> Vec<EventCategory> {
        Vec::new()
    }

    fn handler_id(&self) -> String;

    fn is_active(&self) -> bool {
        true
    }
}

pub struct LoggingEventHandler {
    handler_id: String,
}

impl LoggingEventHandler {
    pub fn new(handler_id: impl Into<String>) -> Self {
        Self {
            handler_id: handler_id.into(),
        }
    }
}

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: Event) -> RegiaResult<()> {
        info!(
            handler = self.handler_id.as_str(),
            event = event.summary().as_str(),
            payload = %event.payload,
            "event received"
        );
        Ok(())
    }

    fn handler_id(&self) -> String {
        self.handler_id.clone()
    }
}

pub struct MetricsEventHandler {
    handler_id: String,
}

impl MetricsEventHandler {
    pub fn new(handler_id: impl Into<String>) -> Self {
        Self {
            handler_id: handler_id.into(),
        }
    }
}

#[async_trait]
impl EventHandler for MetricsEventHandler {
    async fn handle_event(&self, event: Event) -> RegiaResult<()> {
        if let (Some(metric_name), Some(value)) = (
            event.payload.get("metric_name").and_then(|v| v.as_str()),
            event.payload.get("value").and_then(|v| v.as_f64()),
        ) {
            info!(
                handler = self.handler_id.as_str(),
                metric = metric_name,
                value,
                "performance metric"
            );
        }
        Ok(())
    }

    fn supported_categories(&self) -> Vec<EventCategory> {
        vec![EventCategory::SystemPerformanceMetric]
    }

    fn handler_id(&self) -> String {
        self.handler_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPriority;
    use serde_json::json;

    #[tokio::test]
    async fn test_logging_handler_accepts_everything() {
        let handler = LoggingEventHandler::new("logger");
        assert_eq!(handler.handler_id(), "logger");
        assert!(handler.is_active());
        assert!(handler.supported_categories().is_empty());

        let event = Event::new(
            EventCategory::SystemError,
            "test",
            "boom",
            json!({"x": 1}),
            EventPriority::Normal,
        );
        assert!(handler.handle_event(event).await.is_ok());
    }

    #[tokio::test]
    async fn test_metrics_handler_scoped_to_metrics() {
        let handler = MetricsEventHandler::new("metrics");
        assert_eq!(
            handler.supported_categories(),
            vec![EventCategory::SystemPerformanceMetric]
        );
        let event = crate::event::EventFactory::performance_metric_event("queue_depth", 42.0);
        assert!(handler.handle_event(event).await.is_ok());
    }
}

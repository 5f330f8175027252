use std::collections::BTreeMap;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::NotifyContext;
use crate::webhook::{Notification, WebhookNotifier};

/// Forwards matching events to the ops webhook. Level gating happens via
/// the `with_filter` wrapper applied at registry build time.
pub(crate) struct ErrorNotifyLayer {
    notifier: WebhookNotifier,
    context: NotifyContext,
}

impl ErrorNotifyLayer {
    pub(crate) fn new(notifier: WebhookNotifier, context: NotifyContext) -> Self {
        Self { notifier, context }
    }
}

impl<S: Subscriber> Layer<S> for ErrorNotifyLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .values
            .remove("message")
            .map(|raw| unquote_debug_string(&raw));

        self.notifier.try_notify(Notification {
            level: *event.metadata().level(),
            timestamp: Utc::now(),
            service_name: self.context.service_name.clone(),
            environment: self.context.environment.clone(),
            component: self.context.component.clone(),
            target: event.metadata().target().to_string(),
            message,
            fields: visitor.values,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    values: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.values
            .insert(field.name().to_string(), redact(field.name(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.values
            .insert(field.name().to_string(), redact(field.name(), value.to_string()));
    }
}

fn unquote_debug_string(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return trimmed[1..trimmed.len() - 1].to_string();
    }
    trimmed.to_string()
}

fn redact(field_name: &str, value: String) -> String {
    let field = field_name.to_ascii_lowercase();
    let sensitive = field.contains("webhook")
        || field.contains("secret")
        || field.contains("password")
        || field.contains("token")
        || field.contains("authorization");
    if sensitive {
        "[REDACTED]".to_string()
    } else {
        value
    }
}

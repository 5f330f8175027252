use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{Level, warn};
use url::Url;

const CONTENT_LIMIT: usize = 2000;

#[derive(Debug)]
pub(crate) struct Notification {
    pub(crate) level: Level,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
    pub(crate) target: String,
    pub(crate) message: Option<String>,
    pub(crate) fields: BTreeMap<String, String>,
}

/// Fire-and-forget delivery of notifications to a chat-style webhook.
/// Events queue into a bounded channel drained by one background task;
/// overflow drops the event rather than stalling the logging path.
#[derive(Clone)]
pub(crate) struct WebhookNotifier {
    tx: mpsc::Sender<Notification>,
}

impl WebhookNotifier {
    pub(crate) fn new(webhook_url: Url) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(256);

        tokio::spawn(async move {
            let client = match reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(3))
                .build()
            {
                Ok(client) => client,
                Err(error) => {
                    warn!(error = %error, "ops webhook client failed to build");
                    return;
                }
            };

            while let Some(notification) = rx.recv().await {
                let content = format_content(&notification);
                let result = client
                    .post(webhook_url.clone())
                    .json(&json!({ "content": content }))
                    .send()
                    .await;

                match result {
                    Ok(response) if response.status().is_success() => {}
                    Ok(response) => {
                        warn!(status = %response.status(), "ops webhook returned non-success status");
                    }
                    Err(error) if error.is_timeout() => {
                        warn!("ops webhook request timed out");
                    }
                    Err(_) => {
                        // Error details stay out of the log; they can embed
                        // the webhook URL.
                        warn!("ops webhook request failed");
                    }
                }
            }
        });

        Self { tx }
    }

    /// Never blocks the event path; a full queue drops the notification.
    pub(crate) fn try_notify(&self, notification: Notification) {
        if self.tx.try_send(notification).is_err() {
            warn!("ops webhook queue full or closed; dropping notification");
        }
    }
}

fn format_content(notification: &Notification) -> String {
    let mut lines = vec![
        format!(
            "**{}** `{}` `{}` `{}`",
            notification.service_name,
            notification.environment,
            notification.component,
            notification.level.as_str()
        ),
        format!(
            "`{}` `{}`",
            notification
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            notification.target
        ),
    ];

    if let Some(message) = notification.message.as_ref().filter(|m| !m.trim().is_empty()) {
        lines.push(format!("> {}", message.trim()));
    }

    for (key, value) in &notification.fields {
        lines.push(format!("- `{}` = `{}`", key, value));
    }

    truncate_content(lines.join("\n"))
}

fn truncate_content(content: String) -> String {
    const SUFFIX: &str = "\n… (truncated)";
    if content.chars().count() <= CONTENT_LIMIT {
        return content;
    }

    let allowed = CONTENT_LIMIT.saturating_sub(SUFFIX.chars().count());
    let mut truncated: String = content.chars().take(allowed).collect();
    truncated.push_str(SUFFIX);
    truncated
}

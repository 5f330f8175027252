mod layer;
mod webhook;

use anyhow::Result;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Everything the error-notification sink needs to annotate an event.
#[derive(Clone)]
pub(crate) struct NotifyContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

struct NotifySettings {
    context: NotifyContext,
    webhook_url: Option<Url>,
    min_level: Level,
    warning: Option<String>,
}

/// Installs the process-wide tracing stack: RFC3339 UTC formatter, a
/// `RUST_LOG` EnvFilter defaulting to `info`, and (when `OPS_WEBHOOK_URL`
/// is configured) a layer that forwards error-level events to an ops chat
/// webhook.
pub fn init_observability(component: &str) -> Result<()> {
    let settings = settings_from_env(component);

    let notify_layer = settings.webhook_url.as_ref().map(|url| {
        layer::ErrorNotifyLayer::new(
            webhook::WebhookNotifier::new(url.clone()),
            settings.context.clone(),
        )
        .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
            settings.min_level,
        ))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(notify_layer)
        .with(env_filter)
        .try_init()?;

    // Surfaced only after the subscriber exists, so the message is not lost.
    if let Some(warning) = &settings.warning {
        warn!(
            component = %settings.context.component,
            warning = %warning,
            "observability config warning"
        );
    }

    info!(
        service = %settings.context.service_name,
        environment = %settings.context.environment,
        component = %settings.context.component,
        webhook_notifications = settings.webhook_url.is_some(),
        "observability initialized"
    );

    Ok(())
}

fn settings_from_env(component: &str) -> NotifySettings {
    let component = component.trim().to_string();

    let service_name = std::env::var("SERVICE_NAME")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| component.clone());
    let environment = std::env::var("STAGE")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let mut warning = None;
    let webhook_url = match std::env::var("OPS_WEBHOOK_URL").ok().filter(|v| !v.is_empty()) {
        Some(raw) => match Url::parse(&raw) {
            Ok(url) => Some(url),
            Err(err) => {
                // The raw value stays out of the log; webhook URLs carry
                // secrets.
                warning = Some(format!(
                    "OPS_WEBHOOK_URL is set but invalid; notifications disabled (parse error: {err})"
                ));
                None
            }
        },
        None => None,
    };

    let min_level = std::env::var("OPS_NOTIFY_LEVEL")
        .ok()
        .and_then(|raw| parse_level(&raw))
        .unwrap_or(Level::ERROR);

    NotifySettings {
        context: NotifyContext {
            service_name,
            environment,
            component,
        },
        webhook_url,
        min_level,
        warning,
    }
}

fn parse_level(input: &str) -> Option<Level> {
    match input.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

//! notify-worker — polls `alert_events` for pending alerts and dispatches
//! them through the configured webhook/email channels.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use feedline_core::config::Config;
use feedline_notify::store::AlertStore;
use feedline_notify::templating::{TemplateContext, TemplateRenderer, DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT_TEMPLATE};
use feedline_notify::email::EmailNotifier;
use feedline_notify::traits::{Notification, Notifier};
use feedline_notify::webhook::WebhookNotifier;
use feedline_notify::{AlertEvent, Dispatcher};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "notify-worker", version, about = "Dispatches pending alert_events to configured channels")]
struct Cli {
    #[arg(long, env = "FEEDLINE_PROFILE", default_value = "")]
    profile: String,
}

fn build_dispatcher(config: &Config) -> Dispatcher {
    let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
    let renderer = Arc::new(TemplateRenderer::new());

    if config.notify.webhook_configured() {
        match WebhookNotifier::from_config(
            config.notify.webhook_url.clone().unwrap(),
            config.notify.webhook_method.clone(),
            None,
            None,
            renderer.clone(),
        ) {
            Ok(notifier) => channels.push(Box::new(notifier) as Box<dyn Notifier>),
            Err(e) => warn!(error = %e, "invalid webhook notifier config, skipping"),
        }
    }

    if config.notify.email_configured() {
        match EmailNotifier::from_config(
            config.notify.smtp_host.as_deref().unwrap(),
            config.notify.smtp_port,
            config.notify.smtp_tls,
            config.notify.smtp_from.as_deref().unwrap(),
            &config.notify.smtp_to,
        ) {
            Ok(notifier) => channels.push(Box::new(notifier) as Box<dyn Notifier>),
            Err(e) => warn!(error = %e, "invalid email notifier config, skipping"),
        }
    }

    if channels.is_empty() {
        warn!("no notification channels configured, alerts will accumulate undispatched");
    }

    Dispatcher::with_defaults(channels)
}

fn render_notification(renderer: &TemplateRenderer, event: &AlertEvent) -> Result<Notification, feedline_notify::NotifyError> {
    let ctx = TemplateContext::from(event);
    let subject = renderer.render(DEFAULT_SUBJECT_TEMPLATE, &ctx)?;
    let body = renderer.render(DEFAULT_BODY_TEMPLATE, &ctx)?;

    let mut metadata = std::collections::HashMap::new();
    metadata.insert("alert_type".to_string(), event.alert_type.clone());
    metadata.insert("severity".to_string(), event.severity.clone());
    if let Some(batch_id) = &event.batch_id {
        metadata.insert("batch_id".to_string(), batch_id.clone());
    }

    Ok(Notification { subject, body, metadata })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    feedline_core::config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::for_profile(&cli.profile);
    config.log_summary();

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.connection_string())
        .await?;

    let store = AlertStore::new(pool);
    let dispatcher = build_dispatcher(&config);
    let renderer = TemplateRenderer::new();

    let mut shutdown = tokio::signal::ctrl_c();
    let mut ticker = tokio::time::interval(Duration::from_secs(config.notify.poll_interval_seconds));

    info!("notify-worker started, polling every {}s", config.notify.poll_interval_seconds);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = poll_and_dispatch(&store, &dispatcher, &renderer, config.notify.batch_size).await {
                    error!(error = %e, "notify poll cycle failed");
                }
            }
            _ = &mut shutdown => {
                info!("notify-worker shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn poll_and_dispatch(
    store: &AlertStore,
    dispatcher: &Dispatcher,
    renderer: &TemplateRenderer,
    batch_size: u32,
) -> Result<(), feedline_notify::NotifyError> {
    let events = store.claim_pending(batch_size).await?;
    if events.is_empty() {
        return Ok(());
    }

    info!(count = events.len(), "dispatching alerts");

    for event in events {
        let notification = match render_notification(renderer, &event) {
            Ok(n) => n,
            Err(e) => {
                store.mark_failed(event.id, &e.to_string()).await?;
                continue;
            }
        };

        let results = dispatcher.dispatch(&event.alert_type, &notification).await;
        let any_success = results.iter().any(|r| r.success);
        let any_attempted = !results.is_empty();

        if any_success || !any_attempted {
            store.mark_dispatched(event.id).await?;
        } else {
            let errors = results.iter().filter_map(|r| r.error.clone()).collect::<Vec<_>>().join("; ");
            store.mark_failed(event.id, &errors).await?;
        }
    }

    Ok(())
}

//! # Server Mode
//!
//! Runs the HelpMeTest MCP server over stdio.

use crate::auth::CompanyContext;
use crate::config::{ApiConfig, BusSettings, user_agent};
use crate::event_bus::{EventBus, HttpStreamLauncher, StreamLauncher};
use crate::mcp_service::HelpMeTestService;
use crate::notifier::{HttpNotifyTransport, OutboundNotifier};
use crate::shell::cli::McpArgs;
use anyhow::{Context, Result};
use helpmetest_stream_client::client::StreamConfig;
use rmcp::ServiceExt;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

const STARTUP_GREETING_KEY: &str = "startup-greeting";

fn startup_greeting(company: &str, rooms: &[String]) -> String {
    format!(
        "Connected to HelpMeTest as company '{}'. Available rooms: {}. \
Call listen_to_events to receive user messages and test status changes.",
        company,
        rooms.join(", ")
    )
}

/// Build the event bus for a resolved configuration.
pub fn build_event_bus(
    api: &ApiConfig,
    company: &str,
    settings: BusSettings,
) -> Result<Arc<EventBus>> {
    let agent = user_agent();
    let transport = HttpNotifyTransport::new(&api.api_url, api.token.clone(), &agent)
        .context("Failed to create notification client")?;
    let notifier = Arc::new(OutboundNotifier::new(Arc::new(transport)));

    let stream_config = StreamConfig::new(
        api.api_url.clone(),
        api.stream_pattern_for(company),
        api.token.clone(),
    )
    .with_user_agent(agent)
    .with_backoff(settings.reconnect_initial, settings.reconnect_max)
    .with_idle_timeout(settings.stream_idle_timeout);
    let launcher: Arc<dyn StreamLauncher> = Arc::new(HttpStreamLauncher::new(stream_config));

    let bus = EventBus::new(company, settings, notifier, Some(launcher));
    bus.inject_system_message(
        startup_greeting(company, &bus.available_rooms()),
        Some(STARTUP_GREETING_KEY),
    );
    Ok(bus)
}

async fn wait_for_shutdown_signal() -> &'static str {
    tokio::select! {
        _ = signal::ctrl_c() => "SIGINT",
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => "SIGTERM",
    }
}

/// Run in server mode (stdio MCP server).
///
/// # Errors
/// Returns an error if the configuration is incomplete, the company cannot
/// be resolved, or the MCP transport fails.
pub async fn run_server_mode(args: McpArgs) -> Result<()> {
    info!("Starting helpmetest MCP server v{}", env!("CARGO_PKG_VERSION"));

    let api = ApiConfig::resolve(args.overrides())?;
    info!("API: {}", api.api_url);

    let company = CompanyContext::new(api.clone())?
        .active_company()
        .await
        .context("Failed to resolve the active company")?;
    info!("Company: {}", company);

    let bus = build_event_bus(&api, &company, BusSettings::default())?;
    let service = HelpMeTestService::new(bus.clone())
        .serve(rmcp::transport::stdio())
        .await?;

    let cancel = service.cancellation_token();
    tokio::spawn(async move {
        let reason = wait_for_shutdown_signal().await;
        info!("Received {}, shutting down", reason);
        cancel.cancel();
    });

    let result = service.waiting().await;
    bus.shutdown();
    info!("helpmetest MCP server stopped");

    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiOverrides;
    use crate::event_bus::EventPayload;

    fn api() -> ApiConfig {
        ApiConfig::resolve_with(
            ApiOverrides {
                token: Some("tok".to_string()),
                api_url: Some("http://127.0.0.1:9".to_string()),
                ..Default::default()
            },
            |_| None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn bus_starts_with_one_greeting() {
        let bus = build_event_bus(&api(), "acme", BusSettings::default()).unwrap();
        let records = bus.snapshot();
        assert_eq!(records.len(), 1);
        match &records[0].payload {
            EventPayload::SystemMessage(m) => {
                assert!(m.content.contains("'acme'"));
                assert!(m.content.contains("chat.acme"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(
            !bus.inject_system_message("again", Some(STARTUP_GREETING_KEY))
                .is_queued()
        );
    }
}

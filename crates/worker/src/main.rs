//! Headless driver for a single session.
//!
//! ```text
//! atelier-worker <session-id> [--theme <text>] [--derive <text>] [--prompt <text>]
//! ```
//!
//! Loads the session, optionally creates its parent theme and (re)derives
//! its child theme, then submits the prompt and follows the job until it
//! finishes. Session events are printed to stdout as JSON lines.

use std::sync::Arc;

use anyhow::{bail, Context};
use atelier_client::http::{HttpSessionBackend, HttpThemeBackend};
use atelier_client::keyword::KeywordThemeTransform;
use atelier_client::{ClientConfig, SessionBackend, StaticCredential, ThemeTransformBackend};
use atelier_core::job::SessionStatus;
use atelier_pipeline::poller::PollConfig;
use atelier_pipeline::{SessionController, SessionEvent};
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Drive one session: prepare its themes, then generate.
#[derive(Debug, Parser)]
#[command(name = "atelier-worker")]
#[command(about = "Run a generation job for one session")]
#[command(version)]
struct Args {
    /// Session to load from the backend.
    session_id: String,

    /// Create the parent theme from keywords or free text.
    #[arg(long, value_name = "TEXT")]
    theme: Option<String>,

    /// Reset the derived theme and derive a new one from this text.
    #[arg(long, value_name = "TEXT")]
    derive: Option<String>,

    /// Submit a job with this prompt and follow it to the end.
    #[arg(long, value_name = "TEXT")]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_worker=debug,atelier_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = ClientConfig::from_env().context("invalid configuration")?;

    let sessions: Arc<dyn SessionBackend> = Arc::new(HttpSessionBackend::new(&config)?);
    let transform: Arc<dyn ThemeTransformBackend> = match config.transform_url.clone() {
        Some(url) => Arc::new(HttpThemeBackend::new(&config, url)?),
        None => {
            tracing::info!("No transform service configured, using offline keyword transform");
            Arc::new(KeywordThemeTransform::new())
        }
    };
    let credentials = Arc::new(StaticCredential::new(config.api_token.clone()));

    tracing::info!(session_id = %args.session_id, api_url = %config.api_url, "Worker starting");

    let mut session = SessionController::import(
        args.session_id.clone(),
        sessions,
        transform,
        credentials,
        PollConfig::from(&config),
    )
    .await
    .context("failed to load session")?;

    prepare_themes(&session, &args).await?;

    let Some(prompt) = args.prompt else {
        print_view(&session);
        return Ok(());
    };

    let mut events = session.subscribe();
    session.submit_prompt(prompt).await?;

    tokio::select! {
        outcome = follow_job(&mut events) => outcome?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, discarding job");
            session.reset().await;
        }
    }

    print_view(&session);
    match session.view().status {
        SessionStatus::Failed => bail!("generation did not complete"),
        _ => Ok(()),
    }
}

async fn prepare_themes(session: &SessionController, args: &Args) -> anyhow::Result<()> {
    let themes = session.themes();

    if let Some(text) = &args.theme {
        if themes.view().await.parent.is_some() {
            tracing::warn!("Session already has a parent theme, ignoring --theme");
        } else {
            themes.submit_basic_or_custom(text).await?;
        }
    }

    if let Some(text) = &args.derive {
        themes.reset_derived().await?;
        themes.submit_derived_from_text(text).await?;
    }

    if let Some(e) = themes.last_error().await {
        tracing::warn!(error = %e, "Theme state needs attention");
    }
    if let Some(theme) = themes.effective_theme().await {
        tracing::debug!(theme = %theme.to_canonical_json(), "Effective theme");
    }
    Ok(())
}

/// Print session events until the job reaches a terminal state.
async fn follow_job(events: &mut broadcast::Receiver<SessionEvent>) -> anyhow::Result<()> {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Missed session events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        };
        println!("{}", serde_json::to_string(&event)?);
        match event {
            SessionEvent::JobSubmitted { .. } => {}
            SessionEvent::JobCompleted { .. }
            | SessionEvent::JobFailed { .. }
            | SessionEvent::PollAbandoned { .. }
            | SessionEvent::JobReset { .. } => return Ok(()),
        }
    }
}

fn print_view(session: &SessionController) {
    let view = session.view();
    match (&view.status, &view.result_url, &view.error) {
        (_, Some(url), _) => tracing::info!(status = ?view.status, result_url = %url, "Session finished"),
        (_, None, Some(e)) => tracing::error!(status = ?view.status, error = %e, "Session failed"),
        _ => tracing::info!(status = ?view.status, "Session state"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("atelier-worker").chain(args.iter().copied()))
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn parses_session_and_options() {
        let args = parse(&["s-1", "--theme", "sunset, watercolor", "--prompt", "a keeper"]).unwrap();
        assert_eq!(args.session_id, "s-1");
        assert_eq!(args.theme.as_deref(), Some("sunset, watercolor"));
        assert_eq!(args.prompt.as_deref(), Some("a keeper"));
        assert!(args.derive.is_none());
    }

    #[test]
    fn rejects_missing_session_and_values() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["s-1", "--prompt"]).is_err());
        assert!(parse(&["s-1", "--verbose"]).is_err());
        assert!(parse(&["s-1", "s-2"]).is_err());
    }
}

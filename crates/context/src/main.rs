//! CiteForge Context Engine CLI
//!
//! Answers one question against the configured search index and prints
//! progress, the final cited answer and its numbered sources.

use anyhow::Context;
use citeforge_common::{config::AppConfig, metrics, VERSION};
use citeforge_context::{Engine, ProgressEvent, RunHandle};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tokio::signal;
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config);

    info!("Starting CiteForge Context Engine v{}", VERSION);

    if config.observability.metrics_port != 0 {
        init_metrics(config.observability.metrics_port)?;
    }

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        anyhow::bail!("usage: context <question>");
    }

    let engine = Engine::from_config(&config)?;
    let RunHandle {
        run_id,
        mut events,
        task,
    } = engine.start_run(&question, engine.defaults().clone())?;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    print_event(&event);
                    if event.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut ctrl_c, if !cancel_requested => {
                info!("Received Ctrl+C, cancelling run...");
                cancel_requested = true;
                engine.cancel(run_id);
            }
        }
    }

    match task.await? {
        Ok(result) => {
            println!("\n{}\n", result.final_answer_text);
            if !result.all_cited_sections.is_empty() {
                println!("Sources:");
                for cited in &result.all_cited_sections {
                    println!("  [{}] {}", cited.citation.number, cited.section.display_title());
                }
            }
            if result.possibly_incomplete {
                println!("\n(answer may be incomplete: {:?})", result.termination);
            }
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            info!("Run cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_llm_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::LLM_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_run_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::RUN_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    metrics::register_metrics();
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::StateChanged { to, .. } => eprintln!("-- {}", to),
        ProgressEvent::QuestionsPlanned { round, questions } => {
            eprintln!("Round {}:", round);
            for (id, text) in questions {
                eprintln!("  {} {}", id, text);
            }
        }
        ProgressEvent::SubAnswer(update) => {
            let marker = if update.degraded { " (degraded)" } else { "" };
            eprintln!("[{}] {:?}{}\n{}\n", update.question_id, update.sufficiency, marker, update.answer);
        }
        ProgressEvent::BudgetUpdated(budget) => {
            eprintln!("Budget remaining: {}", budget.remaining_budget)
        }
        ProgressEvent::Finished(_) => {}
        ProgressEvent::Cancelled => eprintln!("Run cancelled"),
        ProgressEvent::Failed { message } => eprintln!("Run failed: {}", message),
    }
}

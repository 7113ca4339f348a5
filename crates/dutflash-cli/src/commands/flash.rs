//! Flash command - bring a device to the requested build

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dutflash_core::{select_build_token, BuildTrigger, UpdateRequest};
use dutflash_engine::{Collaborators, FlashOrchestrator, OrchestratorSettings};
use dutflash_local::{CommandDevice, FileTracker, HistoryDir, JsonPropertyStore, LocalBuildResolver};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::MergedConfig;
use crate::output::{OutputContext, ReportRow};

/// Arguments of `dutflash flash`
#[derive(Debug, Clone, Default)]
pub struct FlashArgs {
    pub device: String,
    pub build: Option<String>,
    pub branch: Option<String>,
    pub image: Option<String>,
    pub force: bool,
    pub abort_if_on_build: bool,
    pub attempts: Option<u32>,
    pub trigger: Option<PathBuf>,
}

fn load_trigger(path: &Path) -> Result<BuildTrigger> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trigger file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse trigger file: {}", path.display()))
}

/// Build the request from CLI arguments over config defaults
pub fn build_request(args: &FlashArgs, config: &MergedConfig) -> Result<UpdateRequest> {
    let trigger = args.trigger.as_deref().map(load_trigger).transpose()?;
    if let Some(trigger) = &trigger {
        tracing::info!("Trigger has type {}", trigger.trigger_type);
    }
    let token = select_build_token(trigger.as_ref(), args.build.as_deref());

    let mut builder = UpdateRequest::builder(token)
        .branch(args.branch.clone().unwrap_or_else(|| config.branch.clone()))
        .force_flash(args.force)
        .abort_if_on_build(args.abort_if_on_build)
        .max_attempts(args.attempts.unwrap_or(config.attempts));
    if let Some(image) = &args.image {
        builder = builder.image_name(image)?;
    }
    Ok(builder.build()?)
}

/// Flash a device and report the result
pub async fn flash(args: &FlashArgs, config: &MergedConfig, ctx: &OutputContext) -> Result<ExitCode> {
    let request = build_request(args, config)?;

    let store = Arc::new(JsonPropertyStore::new(&config.properties_dir));
    let mut device = store
        .load(&args.device)
        .await
        .with_context(|| format!("Failed to load properties of device '{}'", args.device))?;

    let collaborators = Collaborators {
        resolver: Arc::new(
            LocalBuildResolver::new(&config.build_store).with_tool_path(&config.tool_path),
        ),
        device: Arc::new(CommandDevice::new(config.device.clone())),
        properties: store.clone(),
        tracker: Arc::new(FileTracker::new(&config.tracking_file)),
        history: Arc::new(HistoryDir::new(&config.history_dir)),
    };
    let orchestrator = FlashOrchestrator::new(
        collaborators,
        OrchestratorSettings::new(&config.download_path, &config.log_dir),
    );

    let spinner = ProgressBar::new_spinner();
    if ctx.interactive() {
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]") {
            spinner.set_style(style);
        }
        spinner.set_message(format!(
            "Flashing {} ({} on {})",
            device.name,
            request.build_token(),
            request.branch()
        ));
        spinner.enable_steady_tick(Duration::from_millis(120));
    } else {
        spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let outcome = tokio::time::timeout(config.timeout, orchestrator.run(&request, &mut device)).await;
    spinner.finish_and_clear();

    match outcome {
        Ok(Ok(report)) => {
            let ok = report.code().is_ok();
            ctx.print_row(&ReportRow::from_report(&report), ok);
            if report.result.attempted() {
                ctx.info(&format!(
                    "Attempt log: {}",
                    orchestrator.settings().log_path.display()
                ));
            }
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Ok(Err(e)) => {
            tracing::error!("Flash run failed: {}", e);
            ctx.print_row(&ReportRow::from_error(&e), false);
            Ok(ExitCode::FAILURE)
        }
        Err(_) => {
            ctx.error(&format!(
                "Flash did not finish within {}s, aborted",
                config.timeout.as_secs()
            ));
            Ok(ExitCode::FAILURE)
        }
    }
}

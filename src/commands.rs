use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;

use crate::cli::{Cli, Command, ImageArgs};
use crate::comfy::{ComfyClient, WebSocketChannel};
use crate::config::LocalgenConfig;
use crate::error::GenError;
use crate::lifecycle::{NoopLifecycle, ServerLifecycle};
use crate::orchestrator::{GenerationRequest, Generator};
use crate::tracker::TrackerConfig;
use crate::ui::{self, CheckReport, JobProgress};
use crate::workflow::constraints::parse_adapter;
use crate::workflow::{Adapter, GenerationParams, Preset, QWEN_LIGHTNING_LORA};

/// Runs one parsed command line.
pub async fn execute(cli: Cli) -> Result<(), GenError> {
    let mut config =
        LocalgenConfig::load(cli.config.as_deref()).map_err(|e| GenError::Config(format!("{e:#}")))?;
    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }
    let client = ComfyClient::new(&config.server_url, config.request_timeout())?;

    let Some((preset, params, output)) = resolve(&cli.command, now_seed())? else {
        return check(&client, &config).await;
    };

    let request = GenerationRequest {
        preset,
        tracker: tracker_config(preset, &cli, &config),
        params,
        output,
        push: !cli.no_push,
        restart_server: cli.restart_server,
        stop_after: cli.stop_after,
    };

    let output_dir = Some(config.output_dir()).filter(|dir| dir.is_dir());
    if cli.restart_server || cli.stop_after {
        let generator = Generator::new(client, config.lifecycle(), output_dir);
        generate(&generator, &request, cli.json).await
    } else {
        let generator = Generator::new(client, NoopLifecycle, output_dir);
        generate(&generator, &request, cli.json).await
    }
}

async fn generate<L: ServerLifecycle>(
    generator: &Generator<L>,
    request: &GenerationRequest,
    json: bool,
) -> Result<(), GenError> {
    let progress = if json {
        JobProgress::hidden()
    } else {
        JobProgress::start(&request.preset.to_string())
    };

    match generator.run(request, &progress).await {
        Ok(record) => {
            progress.complete(&record);
            if json {
                ui::print_record(&record);
            }
            Ok(())
        }
        Err(e) => {
            progress.abandon();
            Err(e)
        }
    }
}

/// Maps a generation subcommand to its preset, parameters and destination.
/// `None` for `check`.
fn resolve(
    command: &Command,
    seed: u64,
) -> Result<Option<(Preset, GenerationParams, Option<PathBuf>)>, GenError> {
    let resolved = match command {
        Command::Image {
            args,
            negative,
            steps,
        } => {
            let params = image_params(Preset::FluxImage, args, negative, *steps, 1024, seed)?;
            (Preset::FluxImage, params, args.output.clone())
        }
        Command::Qwen {
            args,
            negative,
            steps,
            lightning,
        } => {
            let default_steps = if *lightning { 4 } else { 20 };
            let mut params = image_params(
                Preset::QwenImage,
                args,
                negative,
                steps.unwrap_or(default_steps),
                1328,
                seed,
            )?;
            if *lightning {
                params.adapter = Some(Adapter {
                    name: QWEN_LIGHTNING_LORA.to_string(),
                    strength: 1.0,
                });
            }
            (Preset::QwenImage, params, args.output.clone())
        }
        Command::Video {
            prompt,
            negative,
            width,
            height,
            frames,
            fps,
            steps,
            seed: explicit_seed,
            checkpoint,
            output,
        } => {
            let params = GenerationParams {
                prompt: prompt.clone(),
                negative_prompt: negative.clone(),
                width: *width,
                height: *height,
                frames: *frames,
                fps: *fps,
                steps: *steps,
                seed: explicit_seed.unwrap_or(seed),
                checkpoint: checkpoint
                    .clone()
                    .unwrap_or_else(|| Preset::LtxVideo.default_checkpoint().to_string()),
                adapter: None,
            };
            (Preset::LtxVideo, params, Some(output.clone()))
        }
        Command::Check => return Ok(None),
    };
    Ok(Some(resolved))
}

fn image_params(
    preset: Preset,
    args: &ImageArgs,
    negative: &str,
    steps: u32,
    default_side: u32,
    seed: u64,
) -> Result<GenerationParams, GenError> {
    let adapter = args.lora.as_deref().map(parse_adapter).transpose()?;
    Ok(GenerationParams {
        prompt: args.prompt.clone(),
        negative_prompt: negative.to_string(),
        width: args.width.unwrap_or(default_side),
        height: args.height.unwrap_or(default_side),
        frames: 1,
        fps: 1.0,
        steps,
        seed: args.seed.unwrap_or(seed),
        checkpoint: args
            .checkpoint
            .clone()
            .unwrap_or_else(|| preset.default_checkpoint().to_string()),
        adapter,
    })
}

/// Flag, then config file, then the preset's own default.
fn tracker_config(preset: Preset, cli: &Cli, config: &LocalgenConfig) -> TrackerConfig {
    TrackerConfig {
        poll_interval: config
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| preset.default_poll_interval()),
        timeout: cli
            .timeout
            .or(config.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| preset.default_timeout()),
    }
}

fn now_seed() -> u64 {
    Utc::now().timestamp().unsigned_abs()
}

async fn check(client: &ComfyClient, config: &LocalgenConfig) -> Result<(), GenError> {
    let mut report = CheckReport::default();

    let stats = match client.system_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            report.fail("server", client.base_url());
            return Err(e.into());
        }
    };
    report.ok(
        "server",
        format!(
            "{} (ComfyUI {})",
            client.base_url(),
            stats.system.comfyui_version.as_deref().unwrap_or("unknown")
        ),
    );

    if stats.devices.is_empty() {
        report.warn("devices", "none reported");
    }
    for device in &stats.devices {
        match (device.vram_free, device.vram_total) {
            (Some(free), Some(total)) => report.ok(
                "device",
                format!(
                    "{} ({} free of {})",
                    device.name,
                    ui::human_bytes(free),
                    ui::human_bytes(total)
                ),
            ),
            _ => report.ok("device", &device.name),
        }
    }

    let mut folders: Vec<&str> = Preset::ALL.iter().map(Preset::model_folder).collect();
    folders.sort_unstable();
    folders.dedup();
    let mut listed: Vec<(&str, Vec<String>)> = Vec::new();
    for folder in folders {
        match client.models(folder).await {
            Ok(models) => {
                report.ok(folder, format!("{} installed", models.len()));
                listed.push((folder, models));
            }
            Err(e) => report.warn(folder, e),
        }
    }
    if !listed.is_empty() && listed.iter().all(|(_, models)| models.is_empty()) {
        report.fail("models", "none installed");
    }
    for preset in Preset::ALL {
        let Some((_, models)) = listed.iter().find(|(f, _)| *f == preset.model_folder()) else {
            continue;
        };
        let wanted = preset.default_checkpoint();
        if !models.iter().any(|m| m.starts_with(wanted)) {
            report.warn(&preset.to_string(), format!("{wanted} not found"));
        }
    }

    match client.object_info().await {
        Ok(known) => {
            for (preset, missing) in missing_nodes(&known) {
                if missing.is_empty() {
                    report.ok(&preset.to_string(), "all node types available");
                } else {
                    report.warn(
                        &preset.to_string(),
                        format!("missing node types: {}", missing.join(", ")),
                    );
                }
            }
        }
        Err(e) => report.warn("node types", e),
    }

    let output_dir = config.output_dir();
    if output_dir.is_dir() {
        report.ok("output dir", ui::describe_dir(&output_dir));
    } else {
        report.warn("output dir", ui::describe_dir(&output_dir));
    }

    match WebSocketChannel::connect(&client.ws_url("localgen-check")).await {
        Ok(_) => report.ok("push channel", "available"),
        Err(e) => report.warn("push channel", format!("{e}; runs will poll")),
    }

    if !config.server.launch.is_empty() {
        match config.lifecycle().is_running().await {
            Ok(true) => report.ok("process", &config.server.process_pattern),
            Ok(false) => report.warn(
                "process",
                format!("no process matches {:?}", config.server.process_pattern),
            ),
            Err(e) => report.warn("process", e),
        }
    }

    if report.failures() > 0 {
        return Err(GenError::NotFound(format!(
            "{} check(s) failed",
            report.failures()
        )));
    }
    Ok(())
}

/// Node types each preset needs that the server does not provide.
fn missing_nodes(known: &HashSet<String>) -> Vec<(Preset, Vec<&'static str>)> {
    Preset::ALL
        .into_iter()
        .map(|preset| {
            let missing = preset
                .class_types()
                .unwrap_or_default()
                .into_iter()
                .filter(|t| !known.contains(*t))
                .collect();
            (preset, missing)
        })
        .collect()
}

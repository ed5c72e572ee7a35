mod cli;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use indicatif::{HumanBytes, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use wavsplit_core::{plan_outputs, run_with_progress, Config, ProgressEvent};

use crate::cli::build_cli;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();

    let input_path = matches
        .get_one::<PathBuf>("input")
        .expect("required argument");
    if !input_path.exists() {
        return Err(anyhow!("input does not exist: {}", input_path.display()));
    }

    let buffer_size = *matches
        .get_one::<u64>("buffer-size")
        .expect("defaulted argument");
    let overwrite = matches.get_flag("overwrite");
    let dry_run = matches.get_flag("dry-run");
    let verify_format = !matches.get_flag("skip-format-check");

    let mut builder = Config::builder(input_path)
        .buffer_budget_bytes(buffer_size)
        .overwrite(overwrite)
        .verify_format(verify_format);
    if let Some(output_dir) = matches.get_one::<PathBuf>("output") {
        builder = builder.output_dir(output_dir);
    }
    let config = builder.build().with_context(|| {
        format!(
            "failed to create configuration for '{}'",
            input_path.display()
        )
    })?;
    debug!("resolved configuration: {config:?}");

    if dry_run {
        let plan = plan_outputs(&config)
            .with_context(|| format!("failed to plan outputs for '{}'", input_path.display()))?;

        println!("Dry run: would create {} file(s):", plan.len());
        for path in plan {
            println!("  {}", path.display());
        }

        return Ok(());
    }

    let progress = ProgressBar::new(0);
    progress.set_draw_target(ProgressDrawTarget::stderr());

    let bar_style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    let spinner_style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());

    let progress_handle = progress.clone();
    let mut total_label: Option<String> = None;
    let result = run_with_progress(config, move |event| match event {
        ProgressEvent::Start {
            total_chunks,
            total_bytes,
        } => {
            debug!("demultiplexing {total_chunks} chunk file(s)");
            if let Some(total) = total_bytes {
                progress_handle.set_style(bar_style.clone());
                progress_handle.set_length(total.max(1));
                total_label = Some(HumanBytes(total).to_string());
            } else {
                progress_handle.set_style(spinner_style.clone());
                total_label = None;
            }
            progress_handle.enable_steady_tick(Duration::from_millis(100));
            progress_handle.set_message(match total_label.as_deref() {
                Some(total) => format!("0 B / {total}"),
                None => String::new(),
            });
        }
        ProgressEvent::Advance { processed_bytes } => {
            let human = HumanBytes(processed_bytes).to_string();
            match total_label.as_deref() {
                Some(total) => {
                    progress_handle.set_position(processed_bytes);
                    progress_handle.set_message(format!("{human} / {total}"));
                }
                None => progress_handle.set_message(human),
            }
        }
        ProgressEvent::Finish => {
            progress_handle.set_message(String::from("Completed"));
        }
    })
    .with_context(|| format!("failed to demultiplex '{}'", input_path.display()));

    progress.finish_and_clear();

    result?;

    Ok(())
}

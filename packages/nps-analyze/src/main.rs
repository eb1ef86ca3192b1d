use anyhow::{Context, Result};
use clap::Parser;
use console::Term;
use env_logger::Env;
use nps_core::{
    broadcast_rois, sort_roi_map, text, FileImageSource, MatchMode, NpsConfig, Pipeline,
    Progress, RoiMap, StudyTree,
};
use std::path::PathBuf;

mod cli;
mod io;

use cli::Args;
use io::{
    load_config, load_roi_map, parse_roi_grid, prepare_output_dir, save_report, write_run_config,
};

fn print_configuration(args: &Args, config: &NpsConfig, dline: &str) {
    println!("{} Configuration:", text::bold("NPS"));
    println!("  {:<22} {}", "Input Directory:", args.input.display());
    println!("  {:<22} {}", "Output Directory:", args.output.display());
    match (&args.rois, &args.roi_grid) {
        (Some(path), _) => println!("  {:<22} {}", "ROI File:", path.display()),
        (None, Some(grid)) => println!("  {:<22} {}", "ROI Grid:", grid),
        (None, None) => {}
    }
    println!(
        "  {:<22} {}",
        "Background Removal:",
        if config.use_fitting {
            format!("polynomial of order {}", config.fit_order)
        } else {
            "mean".to_string()
        }
    );
    if config.use_truncation {
        println!("  {:<22} {}%", "Truncation:", config.trunc_percentage);
    }
    println!(
        "  {:<22} {} to {} by {} cm^-1",
        "Frequency Grid:", config.start_freq, config.end_freq, config.step
    );
    println!("  {:<22} {} mm", "Default Pixel Size:", config.pixel_size_default);
    println!("  {:<22} {}", "Extensions:", config.extensions.join(", "));
    if config.exclude_start > 0 || config.exclude_end > 0 {
        println!(
            "  {:<22} first {}, last {}",
            "Excluded Files:", config.exclude_start, config.exclude_end
        );
    }
    println!(
        "  {:<22} {}",
        "ROI Key Matching:",
        match config.match_mode {
            MatchMode::Substring => "substring",
            MatchMode::Exact => "exact",
        }
    );
    println!(
        "  {:<22} {}",
        "Parallel Jobs:",
        if config.jobs == 0 {
            "all available cores".to_string()
        } else {
            config.jobs.to_string()
        }
    );
    println!("{}\n", dline);
}

fn print_progress(progress: &Progress) {
    let term = Term::stdout();
    let _ = term.clear_line();
    println!(
        "\r{} Study {}/{}, series {}/{} {} {}",
        text::check_icon(),
        progress.study_index + 1,
        progress.study_count,
        progress.series_index + 1,
        progress.series_count,
        text::highlight(&progress.series_name),
        text::light(format!(
            "({}, about {} left)",
            text::format_duration(progress.elapsed),
            text::format_duration(progress.remaining)
        ))
    );
}

/// Main entry point for the nps-analyze tool.
///
/// Discovers the study/series tree, attaches ROIs to its images, runs the NPS
/// pipeline and writes per-series, per-study and summary CSV files.
fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let line = "-".repeat(72);
    let dline = "=".repeat(72);

    println!(
        "\n{}\n{}\nNoise power spectrum analysis of regions of interest in image series.\nPart of the {} toolkit.\n\nAuthors:\n{}\n{}\n",
        format!(
            "{} {}",
            text::highlight("NPS Analyzer"),
            env!("CARGO_PKG_VERSION")
        ),
        line,
        text::highlight("nps-tools"),
        env!("CARGO_PKG_AUTHORS"),
        dline
    );

    let base = match &args.config {
        Some(path) => load_config(path)?,
        None => NpsConfig::default(),
    };
    let config = args.apply_to(base);
    config.validate().context("Invalid configuration")?;

    print_configuration(&args, &config, &dline);

    let mut tree = StudyTree::discover(&args.input, &config.extensions)?;
    tree.exclude(config.exclude_start, config.exclude_end);
    if tree.is_empty() {
        anyhow::bail!(
            "No images matching {:?} found in {}",
            config.extensions,
            args.input.display()
        );
    }

    let rois: RoiMap = match (&args.rois, &args.roi_grid) {
        (Some(path), _) => load_roi_map(path)?,
        (None, Some(grid)) => {
            let layout = parse_roi_grid(grid)?;
            let files: Vec<PathBuf> = tree.files().cloned().collect();
            broadcast_rois(&files, &layout.rois()?)
        }
        (None, None) => anyhow::bail!("Either --rois or --roi-grid is required."),
    };

    let sorted = sort_roi_map(&tree, &rois, config.match_mode);
    if sorted.studies.is_empty() {
        anyhow::bail!("None of the ROI keys matches a discovered image.");
    }
    println!(
        "{} {} images in {} series of {} studies.",
        text::check_icon(),
        sorted.image_count(),
        sorted.series_count(),
        sorted.studies.len()
    );

    let output_dir = prepare_output_dir(args.output.clone())?;
    let pipeline = Pipeline::new(config)?;
    println!(
        "{} Common frequency grid with {} samples.\n",
        text::check_icon(),
        pipeline.grid().len()
    );

    let report = pipeline.run_with_progress(&sorted, &FileImageSource, None, print_progress);

    let written = save_report(&output_dir, &report)?;
    write_run_config(&output_dir, pipeline.config())?;
    println!(
        "{} {} result files saved to {}",
        text::check_icon(),
        written,
        output_dir.display()
    );

    if !report.skipped_images.is_empty() {
        println!(
            "  {} {} images could not be read:",
            text::warning("!"),
            report.skipped_images.len()
        );
        for skipped in &report.skipped_images {
            println!("    {} {}", skipped.path.display(), text::light(&skipped.reason));
        }
    }
    for failed in &report.failed_series {
        println!(
            "  {} Series {} of {} failed: {}",
            text::cross_icon(),
            failed.series,
            failed.study.display(),
            text::error(&failed.reason)
        );
    }

    println!("{}", line);
    if report.summary.is_empty() {
        anyhow::bail!("No series produced a noise power spectrum.");
    }
    println!("{}", text::success("Analysis completed successfully."));
    println!();

    Ok(())
}

//! Command-line interface for the survey pipeline.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::{loaders, transforms, writers};
use crate::processors::{assembly, grouping, identity, peaks};
use crate::visualization;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "em61-pipeline")]
#[command(about = "EM61 multi-sensor survey log processing pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Layout of an IVS (instrument verification strip) log.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum IvsFormat {
    /// Header line in the file names the columns
    FiveCoil,
    /// Fixed eight-column layout with time-only timestamps
    Standard,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve sensor identities in a survey log and export per-sensor files
    Survey {
        /// Survey log (.xyz) to process
        input: PathBuf,
        /// Print the parsed header and first rows, then continue
        #[arg(long)]
        show_header: bool,
        /// Save a stacked PNG of every group's primary channel with peaks
        #[arg(long)]
        plot: Option<PathBuf>,
        /// Directory for per-sensor .xyz exports
        #[arg(short, long)]
        export_dir: Option<PathBuf>,
        /// Append the resolved peak table to this workbook
        #[arg(long)]
        peak_table: Option<PathBuf>,
        /// Sheet name for the workbook (defaults to the survey date)
        #[arg(long)]
        sheet: Option<String>,
        /// Override the configured sensor names (firing order)
        #[arg(long, value_delimiter = ',')]
        sensors: Vec<String>,
    },

    /// Analyze the calibration-strip response in an IVS log
    Ivs {
        /// IVS log to analyze
        input: PathBuf,
        /// File layout
        #[arg(long, value_enum, default_value_t = IvsFormat::FiveCoil)]
        format: IvsFormat,
        /// Channel to analyze (defaults per layout)
        #[arg(long)]
        channel: Option<String>,
        /// Save a PNG of the detrended channel with peaks marked
        #[arg(long)]
        plot: Option<PathBuf>,
        /// UTM zone override for coordinate projection
        #[arg(long)]
        zone: Option<u8>,
        /// Minimum peak prominence override
        #[arg(long)]
        prominence: Option<f64>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.len() > 39 {
            format!("{}...", &value[..36])
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Survey {
            input,
            show_header,
            plot,
            export_dir,
            peak_table,
            sheet,
            sensors,
        } => {
            // Sensor list override also resizes the group schema.
            let mut config = config;
            if !sensors.is_empty() {
                config.detection.sensor_names = sensors;
            }
            cmd_survey(&input, show_header, plot, export_dir, peak_table, sheet, &config);
        }
        Commands::Ivs {
            input,
            format,
            channel,
            plot,
            zone,
            prominence,
        } => {
            cmd_ivs(&input, format, channel, plot, zone, prominence, &config);
        }
    }
}

fn print_header_preview(table: &loaders::RecordTable) {
    println!("Columns ({}):", table.num_columns());
    println!("  {}", table.columns.join(" "));
    let preview = table.num_rows().min(5);
    for row in 0..preview {
        let cells: Vec<String> = table.data.iter().map(|col| col[row].to_string()).collect();
        println!("  {}", cells.join(" "));
    }
}

fn cmd_survey(
    input: &Path,
    show_header: bool,
    plot: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    peak_table: Option<PathBuf>,
    sheet: Option<String>,
    config: &PipelineConfig,
) {
    let start = Instant::now();

    println!("Processing survey log...");
    println!("Input: {}", input.display());

    let spinner = create_spinner("Loading survey log...");

    let result = run_survey(
        input, show_header, plot, export_dir, peak_table, sheet, config, &spinner,
    );

    spinner.finish_and_clear();

    match result {
        Ok(items) => {
            let mut summary = vec![("Input file", input.display().to_string())];
            summary.extend(items);
            summary.push(("Duration", format!("{:.2?}", start.elapsed())));
            print_summary("Survey Processing Complete", &summary);
        }
        Err(e) => {
            error!("Survey processing failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_survey(
    input: &Path,
    show_header: bool,
    plot: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    peak_table: Option<PathBuf>,
    sheet: Option<String>,
    config: &PipelineConfig,
    spinner: &ProgressBar,
) -> anyhow::Result<Vec<(&'static str, String)>> {
    let column_names = config.survey_column_names();
    let table = loaders::load_survey_table(input, &column_names)
        .with_context(|| format!("loading {}", input.display()))?;
    info!("Loaded {} rows, {} columns", table.num_rows(), table.num_columns());

    if show_header {
        spinner.suspend(|| print_header_preview(&table));
    }

    spinner.set_message("Splitting column groups...");
    let schemas = grouping::GroupSchema::for_survey(config);
    let groups = grouping::split_groups(&table, &schemas).context("splitting column groups")?;
    for group in &groups {
        info!(
            "Group {}: {} rows retained, {} dropped",
            group.group_index + 1,
            group.len(),
            group.dropped_rows
        );
    }

    spinner.set_message("Resolving sensor identities...");
    let detection = &config.detection;
    let identities = identity::resolve_identities(
        &groups,
        detection.window_size,
        detection.prominence,
        &detection.sensor_names,
    )
    .context("resolving sensor identities")?;

    spinner.suspend(|| {
        println!("Resolved sensor identities (firing order):");
        for a in identities.assignments() {
            println!(
                "  {:<4} -> group {} (peak {:.2} at {})",
                a.sensor,
                a.group_index + 1,
                a.peak_value,
                a.peak_time
            );
        }
    });

    let mut summary = Vec::new();
    let survey_date = table.survey_date();
    if let Some(date) = &survey_date {
        summary.push(("Survey date", date.clone()));
    }
    summary.push(("Groups", groups.len().to_string()));
    summary.push((
        "Sensors",
        identities
            .assignments()
            .iter()
            .map(|a| a.sensor.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    ));

    if let Some(plot_path) = plot {
        spinner.set_message("Rendering group grid...");
        let peaks_per_group: Vec<Vec<usize>> = groups
            .iter()
            .map(|g| {
                let channel = g.windowed_primary(detection.window_size);
                if channel.is_empty() {
                    Ok(Vec::new())
                } else {
                    peaks::find_peaks(channel, detection.prominence)
                }
            })
            .collect::<Result<_, _>>()?;
        visualization::plot_group_grid(&plot_path, &groups, &peaks_per_group, "Channel groups")
            .context("rendering group grid")?;
        summary.push(("Plot", plot_path.display().to_string()));
    }

    if let Some(workbook) = peak_table {
        spinner.set_message("Appending peak table...");
        let sheet_name = sheet
            .or_else(|| survey_date.clone())
            .ok_or_else(|| anyhow!("no sheet name given and the log has no DATE column"))?;
        writers::append_peak_sheet_xlsx(&workbook, &sheet_name, &identities)
            .with_context(|| format!("appending sheet '{sheet_name}'"))?;
        summary.push(("Peak table", workbook.display().to_string()));
    }

    if let Some(dir) = export_dir {
        spinner.set_message("Exporting per-sensor files...");
        let date_prefix = survey_date.clone().unwrap_or_else(|| "undated".to_string());
        let trailing: Vec<String> = vec!["TIME".to_string(), "DATE".to_string()];

        let mut exported = 0usize;
        for assignment in identities.assignments() {
            let group = groups
                .iter()
                .find(|g| g.group_index == assignment.group_index)
                .ok_or_else(|| anyhow!("no group {} to export", assignment.group_index + 1))?;

            let (coil_x, coil_y) = config.coil_columns(&assignment.sensor);
            let assembled =
                assembly::assemble_sensor(group, &table, &[coil_x, coil_y], &trailing)
                    .with_context(|| format!("assembling sensor {}", assignment.sensor))?;

            let path = dir.join(format!("{}_{}.xyz", date_prefix, assignment.sensor));
            writers::write_sensor_xyz(&path, &assembled)
                .with_context(|| format!("writing {}", path.display()))?;
            exported += 1;
        }
        summary.push(("Exported files", exported.to_string()));
        summary.push(("Export directory", dir.display().to_string()));
    }

    Ok(summary)
}

fn cmd_ivs(
    input: &Path,
    format: IvsFormat,
    channel: Option<String>,
    plot: Option<PathBuf>,
    zone: Option<u8>,
    prominence: Option<f64>,
    config: &PipelineConfig,
) {
    let start = Instant::now();

    println!("Analyzing IVS log...");
    println!("Input: {}", input.display());

    let spinner = create_spinner("Loading IVS log...");

    let result = run_ivs(input, format, channel, plot, zone, prominence, config, &spinner);

    spinner.finish_and_clear();

    match result {
        Ok(items) => {
            let mut summary = vec![("Input file", input.display().to_string())];
            summary.extend(items);
            summary.push(("Duration", format!("{:.2?}", start.elapsed())));
            print_summary("IVS Analysis Complete", &summary);
        }
        Err(e) => {
            error!("IVS analysis failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_ivs(
    input: &Path,
    format: IvsFormat,
    channel: Option<String>,
    plot: Option<PathBuf>,
    zone: Option<u8>,
    prominence: Option<f64>,
    config: &PipelineConfig,
    spinner: &ProgressBar,
) -> anyhow::Result<Vec<(&'static str, String)>> {
    let table = match format {
        IvsFormat::FiveCoil => loaders::load_ivs_table(input),
        IvsFormat::Standard => loaders::load_standard_ivs_table(input),
    }
    .with_context(|| format!("loading {}", input.display()))?;
    info!("Loaded {} rows, {} columns", table.num_rows(), table.num_columns());

    let zone = zone.unwrap_or(config.transform.utm_zone);
    spinner.set_message("Projecting coordinates...");
    let projected =
        transforms::with_projected_coords(&table, zone).context("projecting coordinates")?;

    let channel_name = channel.unwrap_or_else(|| match format {
        IvsFormat::FiveCoil => config.schema.primary_channel().to_string(),
        IvsFormat::Standard => "STD-4-2".to_string(),
    });
    let raw = projected
        .numeric_column(&channel_name)
        .with_context(|| format!("reading channel {channel_name}"))?;

    spinner.set_message("Detrending channel...");
    let detrended = transforms::demedian(&raw, config.detection.smoothing_window)
        .context("detrending channel")?;

    // Peak detection runs on the present samples; indices map back to rows.
    let mut rows = Vec::new();
    let mut samples = Vec::new();
    for (row, value) in detrended.iter().enumerate() {
        if let Some(v) = value {
            rows.push(row);
            samples.push(*v);
        }
    }

    let min_prominence = prominence.unwrap_or(config.detection.prominence);
    let peak_rows: Vec<usize> = if samples.is_empty() {
        Vec::new()
    } else {
        peaks::find_peaks(&samples, min_prominence)
            .context("detecting peaks")?
            .into_iter()
            .map(|i| rows[i])
            .collect()
    };

    // A quiet strip is a valid outcome, not a failure.
    spinner.suspend(|| {
        if peak_rows.is_empty() {
            println!("No responses above prominence {min_prominence} in {channel_name}");
        } else {
            println!("Responses in {channel_name}:");
            let x = projected.column("X").ok();
            let y = projected.column("Y").ok();
            for &row in &peak_rows {
                let coord = |col: Option<&[loaders::Field]>| {
                    col.and_then(|c| c[row].as_number())
                        .map_or_else(|| "*".to_string(), |v| format!("{v:.2}"))
                };
                let time = projected.datetime[row]
                    .map_or_else(|| "-".to_string(), |t| t.time().to_string());
                println!(
                    "  row {:>6}  X {}  Y {}  value {:.2}  {}",
                    row,
                    coord(x),
                    coord(y),
                    detrended[row].unwrap_or(f64::NAN),
                    time
                );
            }
        }
    });

    if let Some(plot_path) = &plot {
        spinner.set_message("Rendering channel plot...");
        let peak_positions: Vec<usize> = peak_rows
            .iter()
            .map(|row| rows.binary_search(row).unwrap_or(0))
            .collect();
        visualization::plot_channel(plot_path, &samples, &peak_positions, &channel_name)
            .context("rendering channel plot")?;
    }

    let mut summary = vec![
        ("Channel", channel_name),
        ("UTM zone", zone.to_string()),
        ("Samples", samples.len().to_string()),
        ("Responses", peak_rows.len().to_string()),
    ];
    if let Some(plot_path) = plot {
        summary.push(("Plot", plot_path.display().to_string()));
    }

    Ok(summary)
}

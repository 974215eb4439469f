#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::uninlined_format_args)]

mod csv_reader;
mod dataset;
mod error;
mod ml;
mod mrc;
mod structs;
mod subgraph;
mod transforms;

use clap::{Parser, Subcommand, ValueEnum};
use csv_reader::CsvData;
use ml::gbdt::GbdtParams;
use ml::pipeline::{FeaturizeConfig, TrainConfig};
use std::path::{Path, PathBuf};
use structs::{CryoError, FeatureTable, GridSpec, MicrographKey, Result};
use subgraph::{LabelFormat, SubgraphLoader};
use tracing_subscriber::EnvFilter;
use transforms::ImageTransform;

/// Number of columns in component grid images
const PLOT_COLUMNS: usize = 3;

/// cryotile - cryo-EM micrograph tiling, particle matching and featurization
#[derive(Parser, Debug)]
#[command(name = "cryotile")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert per-class directories of .mrcs stacks into one .npy per frame
    Convert {
        /// Class name (repeat once per class)
        #[arg(long = "class", required = true)]
        classes: Vec<String>,

        /// Input directory for each class, in class order
        #[arg(long = "input", required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory for each class, in class order
        #[arg(long = "output", required = true)]
        outputs: Vec<PathBuf>,

        /// Filename suffix of the stacks to convert
        #[arg(long, default_value = "_lowpass.mrcs")]
        ext: String,
    },

    /// Tile micrographs and bucket particle annotations per tile
    Tile {
        /// Particle label file
        #[arg(long)]
        label_file: PathBuf,

        /// Micrograph path template; `{key}` is replaced by the padded key
        #[arg(long)]
        template: String,

        /// Zero-padding width of the key in the template
        #[arg(long, default_value = "4")]
        key_width: usize,

        /// Micrograph keys to process
        #[arg(long = "key", required = true)]
        keys: Vec<MicrographKey>,

        /// Micrograph shape as rows and columns
        #[arg(long, num_args = 2, value_names = ["H", "W"], required = true)]
        input_shape: Vec<usize>,

        /// Tile shape as rows and columns
        #[arg(long, num_args = 2, value_names = ["h", "w"], required = true)]
        sample_shape: Vec<usize>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Lines skipped at the top of the label file
        #[arg(long, default_value = "17")]
        header_lines: usize,

        /// Lines skipped at the bottom of the label file
        #[arg(long, default_value = "1")]
        footer_lines: usize,

        /// Character offset of the micrograph key in the first field
        #[arg(long, default_value = "18")]
        key_offset: usize,

        /// Character length of the micrograph key
        #[arg(long, default_value = "4")]
        key_len: usize,

        /// Keep annotation coordinates in micrograph space
        #[arg(long)]
        no_shift: bool,

        /// Only write annotations.json, skip the tile arrays
        #[arg(long)]
        annotations_only: bool,
    },

    /// Extract decomposition features from per-class .npy images
    Featurize {
        /// Class name (repeat once per class)
        #[arg(long = "class", required = true)]
        classes: Vec<String>,

        /// Input directory of .npy images for each class
        #[arg(long = "input", required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Components per estimator
        #[arg(long, default_value = "9")]
        components: usize,

        /// Transforms to ensemble (default: all)
        #[arg(long = "transform", value_enum)]
        transforms: Vec<TransformArg>,

        /// Side length of the Roberts resize
        #[arg(long, default_value = "28")]
        resize: usize,

        /// Width of the central FFT crop
        #[arg(long, default_value = "50")]
        central_width: usize,

        /// Random seed for FastICA and factor analysis
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Write component grids as PNG
        #[arg(long)]
        plot_components: bool,
    },

    /// Train a GBDT classifier on a features CSV
    Train {
        /// Features CSV
        #[arg(short, long)]
        features: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "./train_output")]
        output: PathBuf,

        /// Target column name
        #[arg(long, default_value = "class")]
        target: String,

        /// Boosting iterations
        #[arg(long, default_value = "10000")]
        epochs: usize,

        #[arg(long, default_value = "0.01")]
        learning_rate: f64,

        #[arg(long, default_value = "31")]
        num_leaves: usize,

        /// Maximum tree depth (-1 = unlimited)
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        max_depth: i32,

        /// Fraction of rows held out for evaluation
        #[arg(long, default_value = "0.3")]
        test_size: f64,

        #[arg(long, default_value = "0")]
        seed: u64,

        /// Threads for scoring (default: rayon global pool)
        #[arg(long)]
        workers: Option<usize>,

        /// Objective name
        #[arg(long, default_value = "binary")]
        objective: String,

        /// Metric logged during training
        #[arg(long, default_value = "auc")]
        metric: String,

        /// Boosting type
        #[arg(long, default_value = "gbdt")]
        boosting: String,

        /// Treat input as TSV instead of CSV
        #[arg(long)]
        tsv: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TransformArg {
    Identity,
    Roberts,
    Fft2,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Commands::Convert {
            classes,
            inputs,
            outputs,
            ext,
        }) => run_convert(&classes, &inputs, &outputs, &ext),

        Some(Commands::Tile {
            label_file,
            template,
            key_width,
            keys,
            input_shape,
            sample_shape,
            output,
            header_lines,
            footer_lines,
            key_offset,
            key_len,
            no_shift,
            annotations_only,
        }) => {
            let grid = GridSpec::new(pair(&input_shape)?, pair(&sample_shape)?)?;
            let format = LabelFormat {
                header_lines,
                footer_lines,
                key_offset,
                key_len,
            };
            let loader = SubgraphLoader::new(
                grid,
                keys,
                key_template(template, key_width),
                &label_file,
                &format,
            )?;
            run_tile(&loader, &output, !no_shift, annotations_only)
        }

        Some(Commands::Featurize {
            classes,
            inputs,
            output,
            components,
            transforms,
            resize,
            central_width,
            seed,
            plot_components,
        }) => {
            let transforms = if transforms.is_empty() {
                vec![TransformArg::Identity, TransformArg::Roberts, TransformArg::Fft2]
            } else {
                transforms
            };
            let config = FeaturizeConfig {
                n_components: components,
                transforms: transforms
                    .into_iter()
                    .map(|t| match t {
                        TransformArg::Identity => ImageTransform::Identity,
                        TransformArg::Roberts => ImageTransform::Roberts {
                            resized_shape: (resize, resize),
                        },
                        TransformArg::Fft2 => ImageTransform::Fft2 { central_width },
                    })
                    .collect(),
                seed,
            };
            run_featurize(&classes, &inputs, &output, &config, plot_components)
        }

        Some(Commands::Train {
            features,
            output,
            target,
            epochs,
            learning_rate,
            num_leaves,
            max_depth,
            test_size,
            seed,
            workers,
            objective,
            metric,
            boosting,
            tsv,
        }) => {
            let config = TrainConfig {
                target,
                epochs,
                test_size,
                seed,
                workers,
                params: GbdtParams {
                    objective: objective.parse()?,
                    metric: metric.parse()?,
                    boosting: boosting.parse()?,
                    max_depth,
                    learning_rate,
                    num_leaves,
                    seed,
                    ..GbdtParams::default()
                },
            };
            run_train(&features, &output, &config, tsv)
        }

        None => {
            eprintln!("No subcommand provided. Use 'cryotile convert', 'tile', 'featurize' or 'train'.");
            eprintln!("Run 'cryotile --help' for usage information.");
            std::process::exit(1);
        }
    }
}

fn pair(values: &[usize]) -> Result<(usize, usize)> {
    match values {
        [a, b] => Ok((*a, *b)),
        _ => Err(CryoError::Config(format!(
            "expected two dimensions, got {}",
            values.len()
        ))),
    }
}

/// Resolve micrograph paths by substituting the zero-padded key into `template`
fn key_template(template: String, width: usize) -> subgraph::KeyToPath {
    Box::new(move |key: MicrographKey| {
        PathBuf::from(template.replace("{key}", &format!("{key:0width$}")))
    })
}

/// Convert .mrcs stacks into per-frame .npy files
fn run_convert(classes: &[String], inputs: &[PathBuf], outputs: &[PathBuf], ext: &str) -> Result<()> {
    for dir in inputs {
        if !dir.is_dir() {
            return Err(CryoError::Config(format!(
                "Input directory not found: {}",
                dir.display()
            )));
        }
    }

    eprintln!("Converting {} classes...", classes.len());
    let total = dataset::create_dataset(classes, inputs, outputs, ext)?;
    eprintln!("Wrote {total} frames");
    for (class, dir) in classes.iter().zip(outputs) {
        eprintln!("  - {class}: {}", dir.display());
    }
    Ok(())
}

/// Write tiles and matched annotations
fn run_tile(loader: &SubgraphLoader, output_dir: &Path, shift: bool, annotations_only: bool) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;

    let grid = loader.grid();
    eprintln!(
        "Tiling {} micrographs into {}x{} cells of {}x{}",
        loader.keys().len(),
        grid.rows(),
        grid.cols(),
        grid.sample_shape.0,
        grid.sample_shape.1
    );

    if !annotations_only {
        let tiles = loader.subgraphs()?;
        let written = ml::output::write_tiles(&output_dir.join("tiles"), &tiles)?;
        eprintln!("Wrote {} tiles", written.len());
    }

    let annotations = loader.subgraph_annotations(shift);
    let n_points: usize = annotations.values().map(Vec::len).sum();
    let path = ml::output::write_annotations_json(output_dir, &annotations)?;
    eprintln!(
        "Matched {n_points} particles in {} cells: {}",
        annotations.len(),
        path.display()
    );
    Ok(())
}

/// Featurize per-class .npy images and write features.csv
fn run_featurize(
    classes: &[String],
    inputs: &[PathBuf],
    output_dir: &Path,
    config: &FeaturizeConfig,
    plot_components: bool,
) -> Result<()> {
    if classes.len() != inputs.len() {
        return Err(CryoError::Config(format!(
            "got {} classes but {} input dirs",
            classes.len(),
            inputs.len()
        )));
    }
    std::fs::create_dir_all(output_dir)?;

    let mut batches = Vec::with_capacity(classes.len());
    for (class, dir) in classes.iter().zip(inputs) {
        let paths = dataset::files_with_extension(dir, ".npy")?;
        eprintln!("Loading {} images for class {class}", paths.len());
        batches.push(dataset::load_npy_paths(&paths)?);
    }

    let outcome = ml::pipeline::run_featurize(batches, config)?;
    let features = outcome.ensembler.features()?;
    let path = ml::output::write_features_csv(output_dir, features, &outcome.classes)?;

    eprintln!("Output written to {}", output_dir.display());
    eprintln!(
        "  - {} ({} samples x {} features)",
        path.display(),
        features.n_samples(),
        features.n_columns()
    );

    if plot_components {
        for plot in outcome.ensembler.plot_2d_components(output_dir, PLOT_COLUMNS)? {
            eprintln!("  - {}", plot.display());
        }
    }
    Ok(())
}

/// Train the classifier, then write ROC and per-row predictions
fn run_train(features_path: &Path, output_dir: &Path, config: &TrainConfig, tsv: bool) -> Result<()> {
    if !features_path.exists() {
        return Err(CryoError::Config(format!(
            "Features file not found: {}",
            features_path.display()
        )));
    }
    std::fs::create_dir_all(output_dir)?;

    let csv_data = CsvData::from_file(features_path, tsv)?;
    eprintln!(
        "Loaded {} rows x {} columns",
        csv_data.row_count(),
        csv_data.col_count()
    );
    let table = FeatureTable::from_csv(&csv_data, &config.target)?;

    let outcome = ml::pipeline::run_train(&table, config)?;
    ml::output::write_roc(output_dir, &outcome.report)?;
    let predictions = ml::output::write_predictions(output_dir, &outcome.predictions)?;

    let summary = format!(
        "trees: {}\nno_skill_auc: {:.3}\nmodel_auc: {:.3}\nrows_scored: {}\n",
        outcome.n_trees,
        outcome.report.no_skill_auc,
        outcome.report.model_auc,
        outcome.predictions.len()
    );
    ml::output::write_summary(output_dir, &summary)?;

    eprintln!("{}", outcome.report.title());
    eprintln!("Output written to {}", output_dir.display());
    eprintln!("  - summary.txt");
    eprintln!("  - roc.csv");
    eprintln!("  - roc.json");
    eprintln!("  - {}", predictions.display());
    Ok(())
}

//! Plant Disease Classification CLI
//!
//! Entry point for training the MobileNetV2 classifier, running single-image
//! inference, generating the class-name file and splitting a raw dataset.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use plant_disease::backend::{backend_name, default_device, InferenceBackend, TrainingBackend};
use plant_disease::dataset::class_names::{
    class_names_from_dataset, write_class_names_file, CLASS_NAMES_FILE,
};
use plant_disease::dataset::folder::{is_image_file, list_image_files};
use plant_disease::dataset::split::{split_dataset, SplitRatios};
use plant_disease::inference::Predictor;
use plant_disease::model::loader::DEFAULT_WEIGHTS_FILE;
use plant_disease::model::ModelLoader;
use plant_disease::training::{run_training, TrainConfig};
use plant_disease::utils::format_probability_bar;
use plant_disease::utils::logging::{init_logging, LogConfig};

/// MobileNetV2 plant disease classifier
#[derive(Parser, Debug)]
#[command(name = "plant_disease")]
#[command(version)]
#[command(about = "Plant disease classification with MobileNetV2 and Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune MobileNetV2 on a train/val/test split
    Train {
        /// TOML file with training settings; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset root containing train/, val/ and test/
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Output directory for weights, class names and metrics
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Pretrained MobileNetV2 weights to start from
        #[arg(short, long)]
        pretrained: Option<PathBuf>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Initial learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Epochs without improvement before stopping
        #[arg(long)]
        patience: Option<usize>,

        /// Square input resolution
        #[arg(long)]
        image_size: Option<usize>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Decode all images into memory before training
        #[arg(long, default_value = "false")]
        cache: bool,
    },

    /// Classify a single image or every image in a directory
    Infer {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Path to trained weights
        #[arg(short, long, default_value = DEFAULT_WEIGHTS_FILE)]
        model: PathBuf,

        /// Class-name file
        #[arg(short, long, default_value = CLASS_NAMES_FILE)]
        class_names: PathBuf,

        /// Dataset root used when the class-name file is missing
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Number of predictions to show per image
        #[arg(long, default_value = "5")]
        top_k: usize,
    },

    /// Write the class-name file from a dataset's train/ folders
    ClassNames {
        /// Dataset root containing train/
        #[arg(short, long, default_value = "dataset_split")]
        data_dir: PathBuf,

        /// Output file
        #[arg(short, long, default_value = CLASS_NAMES_FILE)]
        output: PathBuf,
    },

    /// Split a flat class-folder dataset into train/val/test
    Split {
        /// Folder holding one subfolder per class
        #[arg(short, long)]
        input: PathBuf,

        /// Folder to create train/, val/ and test/ in
        #[arg(short, long, default_value = "dataset_split")]
        output: PathBuf,

        /// Train fraction
        #[arg(long, default_value = "0.7")]
        train: f64,

        /// Validation fraction
        #[arg(long, default_value = "0.15")]
        val: f64,

        /// Test fraction
        #[arg(long, default_value = "0.15")]
        test: f64,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn log_config(cli: &Cli) -> LogConfig {
    if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = init_logging(&log_config(&cli));

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            data_dir,
            output_dir,
            pretrained,
            epochs,
            batch_size,
            learning_rate,
            patience,
            image_size,
            seed,
            cache,
        } => {
            let mut train_config = match config {
                Some(path) => TrainConfig::from_toml_file(&path)?,
                None => TrainConfig::default(),
            };

            if let Some(v) = data_dir {
                train_config.data_dir = v;
            }
            if let Some(v) = output_dir {
                train_config.output_dir = v;
            }
            if pretrained.is_some() {
                train_config.pretrained = pretrained;
            }
            if let Some(v) = epochs {
                train_config.epochs = v;
            }
            if let Some(v) = batch_size {
                train_config.batch_size = v;
            }
            if let Some(v) = learning_rate {
                train_config.learning_rate = v;
            }
            if let Some(v) = patience {
                train_config.patience = v;
            }
            if let Some(v) = image_size {
                train_config.image_size = v;
            }
            if let Some(v) = seed {
                train_config.seed = v;
            }
            train_config.cache_images |= cache;

            cmd_train(&train_config)?;
        }

        Commands::Infer {
            input,
            model,
            class_names,
            data_dir,
            top_k,
        } => {
            cmd_infer(&input, &model, &class_names, data_dir, top_k)?;
        }

        Commands::ClassNames { data_dir, output } => {
            cmd_class_names(&data_dir, &output)?;
        }

        Commands::Split {
            input,
            output,
            train,
            val,
            test,
            seed,
        } => {
            cmd_split(&input, &output, SplitRatios::new(train, val, test)?, seed)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ========================================================
   Plant Disease Detection
   MobileNetV2 transfer learning with Burn + Rust
 ========================================================
  "#
        .green()
    );
}

fn cmd_train(config: &TrainConfig) -> Result<()> {
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Data:          {}", config.data_dir.display());
    println!("  Output:        {}", config.output_dir.display());
    println!("  Epochs:        {}", config.epochs);
    println!("  Batch size:    {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Patience:      {}", config.patience);
    println!("  Image size:    {}", config.image_size);
    println!("  Backend:       {}", backend_name());
    println!();

    let device = default_device();
    let outcome = run_training::<TrainingBackend>(config, &device)?;

    println!();
    println!("{}", outcome.test_metrics.display());
    match &outcome.weights_path {
        Some(weights) => {
            println!("{}", "Next steps:".cyan().bold());
            println!(
                "  - Run inference: plant_disease infer --model {} --class-names {} --input <image>",
                weights.display(),
                config.output_dir.join(CLASS_NAMES_FILE).display()
            );
        }
        None => println!(
            "{}",
            "Validation accuracy never improved; no weights were saved.".yellow()
        ),
    }

    Ok(())
}

fn cmd_infer(
    input: &Path,
    model: &Path,
    class_names: &Path,
    data_dir: Option<PathBuf>,
    top_k: usize,
) -> Result<()> {
    info!("Running inference");
    info!("  Input: {}", input.display());
    info!("  Model: {}", model.display());

    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  Input:   {}", input.display());
    println!("  Model:   {}", model.display());
    println!("  Backend: {}", backend_name());
    println!();

    if !input.exists() {
        anyhow::bail!("Input path not found: {}", input.display());
    }

    let files: Vec<PathBuf> = if input.is_dir() {
        list_image_files(input)
    } else if is_image_file(input) {
        vec![input.to_path_buf()]
    } else {
        anyhow::bail!("Not a supported image file: {}", input.display());
    };

    if files.is_empty() {
        anyhow::bail!("No images found in {}", input.display());
    }

    println!("{}", "Loading model...".cyan());
    let device = default_device();
    let loaded = ModelLoader::new(model)
        .with_class_names_file(class_names)
        .with_data_dir(data_dir)
        .load::<InferenceBackend>(&device)?;
    println!(
        "  {} classes (names from {})",
        loaded.num_classes, loaded.class_name_source
    );
    println!();

    let predictor = Predictor::from_loaded(loaded, device);

    for file in files {
        let prediction = predictor.predict_file(&file)?;

        println!("{}", file.display().to_string().yellow().bold());
        println!(
            "  {} {} ({:.2}%)",
            "Prediction:".green(),
            prediction.class_name,
            prediction.confidence * 100.0
        );
        for entry in prediction.top_k(top_k) {
            println!(
                "    {:<40} {}",
                entry.class_name,
                format_probability_bar(entry.probability, 20)
            );
        }
        println!("  Inference time: {:.2} ms", prediction.inference_time_ms);
        println!();
    }

    Ok(())
}

fn cmd_class_names(data_dir: &Path, output: &Path) -> Result<()> {
    let class_names = class_names_from_dataset(data_dir)?;
    if class_names.is_empty() {
        anyhow::bail!(
            "No class folders found in {}",
            data_dir.join("train").display()
        );
    }

    write_class_names_file(output, &class_names)?;

    println!(
        "{} Wrote {} class names to {}",
        "Done:".green(),
        class_names.len(),
        output.display()
    );
    for (i, name) in class_names.iter().enumerate() {
        println!("  {:>3}: {}", i, name);
    }

    Ok(())
}

fn cmd_split(input: &Path, output: &Path, ratios: SplitRatios, seed: u64) -> Result<()> {
    println!("{}", "Splitting Dataset...".cyan().bold());
    println!("  Input:  {}", input.display());
    println!("  Output: {}", output.display());
    println!(
        "  Ratios: {:.2} / {:.2} / {:.2} (seed {})",
        ratios.train, ratios.val, ratios.test, seed
    );
    println!();

    let summary = split_dataset(input, output, ratios, seed)?;
    let totals = summary.totals();

    println!("{}", "Split complete!".green().bold());
    println!("  Classes: {}", summary.num_classes());
    println!("  Train:   {}", totals.train);
    println!("  Val:     {}", totals.val);
    println!("  Test:    {}", totals.test);
    println!();
    println!("{}", "Next steps:".cyan().bold());
    println!(
        "  - Generate class names: plant_disease class-names --data-dir {}",
        output.display()
    );

    Ok(())
}

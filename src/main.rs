//! Fantasy Premier League points prediction CLI
//!
//! Downloads player gameweek history, trains an LSTM on sliding windows of it,
//! and predicts every player's points for the next gameweek.

use clap::{Parser, Subcommand};
use fpl::report::OutputFormat;
use fpl::{Config, Result};

#[derive(Parser)]
#[command(name = "fpl")]
#[command(about = "Fantasy Premier League points prediction using an LSTM", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Train the LSTM model
    Train {
        /// Override number of epochs
        #[arg(long)]
        epochs: Option<usize>,
        /// Skip k-fold cross-validation
        #[arg(long)]
        no_cv: bool,
    },
    /// Predict next-gameweek points for every player
    Predict {
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
        /// Only show the N highest predictions
        #[arg(long)]
        top: Option<usize>,
    },
    /// Sync data, train, and predict in one go
    Run,
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Download season data from the FPL data mirror
    Sync {
        /// Do not download understat files
        #[arg(long)]
        skip_understat: bool,
        /// Only fetch gameweek files for the first N players
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show local data status
    Status,
}

fn main() {
    let cli = Cli::parse();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let log_level = if cli.verbose { "debug" } else { "info" };
    if let Err(e) = fpl::logging::init(log_level, config.logging.file.as_deref()) {
        eprintln!("Error initializing logging: {}", e);
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Sync {
                skip_understat,
                limit,
            } => commands::data_sync(&config, skip_understat, limit),
            DataCommands::Status => commands::data_status(&config),
        },
        Commands::Train { epochs, no_cv } => commands::train(&config, epochs, no_cv),
        Commands::Predict { format, top } => commands::predict(&config, format, top),
        Commands::Run => commands::run(&config),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;
    use fpl::data::dataset::{train_test_split, validation_split};
    use fpl::data::fetch::{IngestOptions, KEY_FILES};
    use fpl::data::{Fetcher, Lookups, RowStore};
    use fpl::features::{build_sequences, FeatureNormalization};
    use fpl::model::PointsLstmConfig;
    use fpl::predict::{ModelMeta, Predictor};
    use fpl::report;
    use fpl::training::{cross_validate, evaluate, predict_windows, Trainer};
    use fpl::FplError;

    type MyBackend = NdArray<f32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all(&config.data.data_dir)?;
        std::fs::create_dir_all(&config.data.output_dir)?;
        if let Some(model_dir) = config.data.model_path.parent() {
            std::fs::create_dir_all(model_dir)?;
        }
        println!(
            "Created {}/, {}/ and model directories",
            config.data.data_dir.display(),
            config.data.output_dir.display()
        );

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings (season, window length, ...)", config_path);
        println!("  2. Run 'fpl data sync' to download player data");
        println!("  3. Run 'fpl train' to train the model");
        println!("  4. Run 'fpl predict' to predict the next gameweek");

        Ok(())
    }

    pub fn data_sync(config: &Config, skip_understat: bool, limit: Option<usize>) -> Result<()> {
        log::info!("Starting data ingestion...");

        let fetcher = Fetcher::new(&config.data)?;
        let report = fetcher.ingest(&IngestOptions {
            skip_understat,
            player_limit: limit,
        })?;

        println!("{}", report);
        for entry in report.problems() {
            println!("  {}: {:?}", entry.file, entry.outcome);
        }

        log::info!("Data ingestion completed.");
        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let data_dir = &config.data.data_dir;

        println!("Data Status");
        println!("───────────────────────────────");
        println!("  Season:     {}", config.data.season);
        println!("  Directory:  {}", data_dir.display());

        for file in KEY_FILES {
            let mark = if data_dir.join(file).exists() { "ok" } else { "missing" };
            println!("  {:<22}{}", file, mark);
        }

        let understat = count_entries(&config.data.understat_dir());
        println!("  Understat files:  {}", understat);

        let lookups = Lookups::load(data_dir)?;
        let home_goals: i64 = lookups.fixtures.iter().map(|f| f.home_goals_scored()).sum();
        println!("  Fixtures:   {} ({} home goals)", lookups.fixtures.len(), home_goals);
        println!("  Teams:      {}", lookups.teams.len());

        let store = RowStore::load(data_dir)?;
        let summary = store.summary();
        println!("  Players:    {}", summary.players);
        println!("  Rows:       {}", summary.rows);
        if let (Some(first), Some(last)) = (summary.first_gameweek, summary.last_gameweek) {
            println!("  Gameweeks:  {} to {}", first, last);
        }
        let columns: Vec<String> = summary.columns.iter().map(|c| c.to_string()).collect();
        println!("  Columns:    {}", columns.join(", "));

        let model = config.data.model_file();
        if model.exists() {
            println!("  Model:      {}", model.display());
        } else {
            println!("  Model:      not trained");
        }

        Ok(())
    }

    fn count_entries(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }

    fn load_store(config: &Config) -> Result<RowStore> {
        let store = RowStore::load(&config.data.data_dir)?;
        if store.is_empty() {
            return Err(FplError::Config(
                "No player gameweek data found. Run 'fpl data sync' first.".to_string(),
            ));
        }
        Ok(store)
    }

    pub fn train(config: &Config, epochs: Option<usize>, no_cv: bool) -> Result<()> {
        let mut training_config = config.training.clone();
        if let Some(e) = epochs {
            training_config.epochs = e;
        }
        let seq = &config.sequence;
        let device = NdArrayDevice::default();

        log::info!("Starting data processing...");
        let mut store = load_store(config)?;
        let lookups = Lookups::load(&config.data.data_dir)?;

        let normalization = FeatureNormalization::fit(&store, &seq.features)?;
        normalization.apply(&mut store);
        let set = build_sequences(&store, seq.window_length, &seq.features, seq.target)?;
        log::info!(
            "Data processing completed: {} windows of {} gameweeks from {} players",
            set.len(),
            set.window_length,
            store.player_ids().len()
        );

        log::info!("Starting model training...");
        let (train_val, test) = train_test_split(&set, training_config.test_split, training_config.seed);
        let (train, val) = validation_split(&train_val, training_config.validation_split);

        let model_config = PointsLstmConfig::from_model_config(&config.model, set.feature_count);
        let trainer = Trainer::<MyAutodiffBackend>::new(device.clone(), &model_config, training_config.clone());
        let (model, history) = trainer.train(&train, Some(&val))?;
        let model = model.valid();

        let test_metrics = evaluate(&model, &test, training_config.batch_size, &device);
        log::info!(
            "Test Loss: {:.4}, Test MAE: {:.4} (best epoch {})",
            test_metrics.avg_loss(),
            test_metrics.mae(),
            history.best_epoch + 1
        );

        if let Some(model_dir) = config.data.model_path.parent() {
            std::fs::create_dir_all(model_dir)?;
        }
        let model_path = config.data.model_path.to_str().ok_or_else(|| {
            FplError::Config(format!("model path is not valid UTF-8: {}", config.data.model_path.display()))
        })?;
        model.save(model_path)?;

        let meta = ModelMeta {
            model: model_config.clone(),
            normalization,
            window_length: seq.window_length,
            features: seq.features.clone(),
            target: seq.target,
            season: config.data.season.clone(),
            trained_at: chrono::Utc::now(),
            train_windows: train.len(),
            test_loss: (!test.is_empty()).then(|| test_metrics.avg_loss()),
            test_mae: (!test.is_empty()).then(|| test_metrics.mae()),
        };
        meta.save(config.data.model_meta_file())?;
        log::info!("Model saved to {}", config.data.model_file().display());
        log::info!("Model training completed.");

        if !no_cv && training_config.k_folds >= 2 {
            log::info!("Starting {}-fold cross-validation...", training_config.k_folds);
            match cross_validate::<MyAutodiffBackend>(&device, &set, &model_config, &training_config) {
                Ok(summary) => println!("{}", summary),
                Err(e) => log::warn!("Cross-validation skipped: {}", e),
            }
        }

        let predictions = predict_windows(&model, &test, training_config.batch_size, &device);
        let errors = report::largest_errors(&test, &predictions, &lookups, config.report.top_errors);
        report::write_csv(config.data.output_dir.join("largest_errors.csv"), &errors)?;
        println!("{}", report::errors_table(&errors));

        Ok(())
    }

    pub fn predict(config: &Config, format: OutputFormat, top: Option<usize>) -> Result<()> {
        let device = NdArrayDevice::default();
        let predictor = Predictor::<MyBackend>::load(config, device)?;

        let meta = predictor.meta();
        if meta.window_length != config.sequence.window_length || meta.features != config.sequence.features {
            log::warn!(
                "Config sequence settings differ from the trained model; using the model's (window {}, features {:?})",
                meta.window_length,
                meta.features
            );
        }

        log::info!("Starting prediction...");
        let mut store = load_store(config)?;
        let lookups = Lookups::load(&config.data.data_dir)?;
        let prices = report::latest_prices(&store, &lookups);

        let predictions = predictor.predict_store(&mut store)?;
        let named = report::name_predictions(&predictions, &lookups);
        for p in &named {
            log::info!("{}", report::prediction_line(p));
        }
        log::info!("Predicted {} of {} players", named.len(), store.player_ids().len());

        let output_dir = &config.data.output_dir;
        report::write_csv(output_dir.join("predictions.csv"), &named)?;
        let points = report::price_vs_points(&named, &prices, &lookups, config.report.top_n);
        report::write_csv(output_dir.join("price_vs_points.csv"), &points)?;

        let ranked = report::rank_predictions(&named, top);
        println!("{}", report::render_predictions(&ranked, format)?);
        if format == OutputFormat::Table {
            println!("{}", report::price_table(&points));
            println!("Colours: {}", report::position_legend());
        }

        log::info!("Prediction completed.");
        Ok(())
    }

    pub fn run(config: &Config) -> Result<()> {
        data_sync(config, false, None)?;
        train(config, None, false)?;
        predict(config, OutputFormat::Table, None)
    }
}

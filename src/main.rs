//! Expected-goals prediction CLI
//!
//! Scrapes per-player match logs, trains a goal regression net on rolling
//! form features, and predicts or serves expected goals for upcoming
//! fixtures.

use clap::{Parser, Subcommand};
use xgoals::{Config, Result};

#[derive(Parser)]
#[command(name = "xgoals")]
#[command(about = "Football expected-goals prediction from player form", long_about = None)]
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
    /// Train the goal regression model
    Train {
        /// Override number of epochs
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Predict expected goals for a fixture between two rosters
    Predict {
        /// Team A roster, comma-separated player names
        #[arg(long = "team-a")]
        team_a: String,
        /// Team B roster, comma-separated player names
        #[arg(long = "team-b")]
        team_b: String,
    },
    /// Run the prediction API server
    Serve {
        /// Override listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Scrape player match logs for every configured team
    Sync {
        /// Only sync a single team (by name)
        #[arg(long)]
        team: Option<String>,
    },
    /// Show database status
    Status,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

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

    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Sync { team } => commands::data_sync(&config, team),
            DataCommands::Status => commands::data_status(&config),
        },
        Commands::Train { epochs } => commands::train(&config, epochs),
        Commands::Predict { team_a, team_b } => commands::predict(&config, &team_a, &team_b),
        Commands::Serve { port } => commands::serve(&config, port),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use std::time::Duration;

    use xgoals::data::scrapers::fbref::{align_to_schema, load_teams, FbrefScraper};
    use xgoals::data::scrapers::with_retry;
    use xgoals::data::PlayerStore;
    use xgoals::features::assemble::{TARGET_TEAM_A_GOALS, TARGET_TEAM_B_GOALS};
    use xgoals::features::pipeline::{build_fixture_row, build_training_data};
    use xgoals::model::{GoalPredictor, ModelManifest};

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all(&config.data.model_dir)?;
        println!("Created data/ and {}/ directories", config.data.model_dir);

        println!("\nNext steps:");
        println!("  1. Edit {} and {} for your league", config_path, config.scraper.teams_file);
        println!("  2. Run 'xgoals data sync' to scrape player match logs");
        println!("  3. Run 'xgoals train' to train the model");
        println!("  4. Run 'xgoals serve' or 'xgoals predict' for expected goals");

        Ok(())
    }

    pub fn data_sync(config: &Config, only_team: Option<String>) -> Result<()> {
        let store = PlayerStore::open(&config.data.database_path)?;
        let teams = load_teams(&config.scraper.teams_file)?;
        let teams: Vec<_> = match &only_team {
            Some(name) => teams.into_iter().filter(|t| t.name == *name).collect(),
            None => teams,
        };
        if teams.is_empty() {
            return Err(xgoals::XgoalsError::Config(format!(
                "no teams to sync (teams file: {})",
                config.scraper.teams_file
            )));
        }

        let scraper = FbrefScraper::new(Duration::from_millis(config.scraper.request_delay_ms))?;
        let mut schema = store.stat_schema()?;
        let mut stored = 0;

        for team in &teams {
            println!("Syncing {} ({})...", team.name, config.scraper.season);
            let links = with_retry(
                || scraper.team_match_links(&team.code, &team.name, &config.scraper.season),
                3,
            )?;
            log::info!("{}: {} match pages", team.name, links.len());

            for link in &links {
                let set = match with_retry(|| scraper.match_player_records(link), 3) {
                    Ok(set) => set,
                    Err(e) => {
                        log::warn!("skipping {}: {}", link, e);
                        continue;
                    }
                };
                let set = match &schema {
                    Some(target) => align_to_schema(set, target),
                    None => {
                        schema = Some(set.schema.clone());
                        set
                    }
                };
                stored += store.upsert_records(&set)?;
            }
        }

        println!("Stored {} player-match rows ({} total)", stored, store.record_count()?);
        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let store = PlayerStore::open(&config.data.database_path)?;
        let records = store.record_count()?;
        let players = store.latest_players()?;

        println!("Database: {}", config.data.database_path);
        println!("  Player-match rows: {}", records);
        println!("  Players:           {}", players.len());
        match store.stat_schema()? {
            Some(schema) => println!("  Statistics:        {}", schema.len()),
            None => println!("  Statistics:        (no data yet)"),
        }
        Ok(())
    }

    pub fn train(config: &Config, epochs: Option<usize>) -> Result<()> {
        use burn::backend::{Autodiff, NdArray};
        use burn::module::AutodiffModule;

        type TrainBackend = Autodiff<NdArray<f32>>;

        let mut training_config = config.training.clone();
        if let Some(e) = epochs {
            training_config.epochs = e;
        }

        let store = PlayerStore::open(&config.data.database_path)?;
        let set = store.get_all()?;
        println!("Loaded {} player-match rows", set.records.len());

        let targets = vec![
            TARGET_TEAM_A_GOALS.to_string(),
            TARGET_TEAM_B_GOALS.to_string(),
        ];
        let data = build_training_data(
            &set,
            config.pipeline.window_size,
            &config.pipeline.positions,
            &config.pipeline.goals_stat,
            &targets,
        )?;
        println!(
            "Training set: {} matches x {} features",
            data.features.rows.len(),
            data.features.columns.len()
        );

        let device = Default::default();
        let (model, manifest, history) =
            xgoals::training::train::<TrainBackend>(&device, &training_config, &data)?;

        manifest.save(&config.data.model_dir)?;
        let inference_model = model.valid();
        inference_model.save(&ModelManifest::weights_path(&config.data.model_dir))?;

        let predictor = GoalPredictor::new(inference_model, manifest, Default::default());
        let predictions = predictor.predict(&data.features)?;
        let r2 = xgoals::training::r_squared(&predictions, &data.targets.rows);

        println!(
            "Done. Best epoch {} (val loss {:.4}, val RMSE {:.2} goals, R² {:.3})",
            history.best_epoch + 1,
            history.best_val_loss,
            history.val_rmses[history.best_epoch],
            r2,
        );
        println!("Model saved to {}/", config.data.model_dir);
        Ok(())
    }

    pub fn predict(config: &Config, team_a: &str, team_b: &str) -> Result<()> {
        use burn::backend::NdArray;

        let team_a_players = parse_roster(team_a);
        let team_b_players = parse_roster(team_b);

        let store = PlayerStore::open(&config.data.database_path)?;
        let mut all = team_a_players.clone();
        all.extend(team_b_players.iter().cloned());
        let set = store.get_for_players(&all)?;

        let features = build_fixture_row(
            &set,
            &team_a_players,
            &team_b_players,
            config.pipeline.window_size,
            &config.pipeline.positions,
        )?;

        let predictor =
            GoalPredictor::<NdArray<f32>>::load(&config.data.model_dir, Default::default())?;
        let prediction = predictor.predict(&features)?;

        let goals = |target: &str| -> Result<f64> {
            let idx = predictor.manifest().target_index(target)?;
            Ok(prediction[0][idx].round().max(0.0))
        };
        let team_a_goals = goals(TARGET_TEAM_A_GOALS)?;
        let team_b_goals = goals(TARGET_TEAM_B_GOALS)?;

        println!(
            r#"
┌─────────────────────────────────────────────────┐
│  Team A ({} players) vs Team B ({} players)
├─────────────────────────────────────────────────┤
│  Expected goals:  {:.0} - {:.0}
└─────────────────────────────────────────────────┘
"#,
            team_a_players.len(),
            team_b_players.len(),
            team_a_goals,
            team_b_goals,
        );
        Ok(())
    }

    pub fn serve(config: &Config, port: Option<u16>) -> Result<()> {
        let mut config = config.clone();
        if let Some(p) = port {
            config.server.port = p;
        }
        let store = PlayerStore::open(&config.data.database_path)?;

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(xgoals::serve::serve(&config, store))
    }

    fn parse_roster(arg: &str) -> Vec<String> {
        arg.split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }
}

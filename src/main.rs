//! CLI entry point for the perceptual image hash database.
//!
//! Provides commands for hashing images, inserting them into the
//! similarity index, querying by radius, and index maintenance.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use picdex::hash::{self, Hasher, Preprocess, ppm};
use picdex::io::{ExitCode, JsonResponse, OutputFormat};
use picdex::{HashDatabase, HashError, IndexError, Settings};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Perceptual image hashing with similarity search
#[derive(Parser)]
#[command(
    name = "picdex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Perceptual image hashing with similarity search",
    long_about = "Computes perceptual hashes of images and stores them in a \
similarity-searchable index. Queries return every stored item within a \
Hamming radius of the query image.",
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom picdex.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Compute perceptual hashes of image files
    #[command(about = "Print hex hashes of PPM files, or of images streamed on stdin")]
    Hash {
        /// Image files (PPM); reads stdin when empty
        files: Vec<PathBuf>,

        /// Hash algorithm (overrides config): block, dct1..dct4
        #[arg(short, long)]
        algorithm: Option<String>,

        /// Don't output filenames
        #[arg(short, long)]
        quiet: bool,
    },

    /// Add images to the database
    #[command(about = "Hash images and insert them into the similarity index")]
    Insert {
        /// Image files (PPM); the path is the item name
        files: Vec<PathBuf>,
    },

    /// Find similar images
    #[command(about = "Return stored items within a Hamming radius of the query image")]
    Query {
        /// Query image file (PPM)
        file: Option<PathBuf>,

        /// Query by hex hash instead of an image file
        #[arg(long, conflicts_with = "file")]
        hex: Option<String>,

        /// Maximum Hamming distance
        #[arg(short, long, default_value = "4")]
        radius: u32,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Manage vantage points
    Vantage {
        #[command(subcommand)]
        action: VantageAction,
    },

    /// Rebalance the index
    #[command(about = "Recompute shell boundaries for one or all vantage points")]
    Balance {
        /// Vantage point id; rebalances all drifted ones when omitted
        vp_id: Option<i64>,
    },

    /// Show index statistics
    Stats,

    /// Rename an item
    Rename { old: String, new: String },

    /// Remove an item (its point stays in the index)
    Remove { name: String },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,
}

#[derive(Subcommand)]
enum VantageAction {
    /// Promote an image (or stored point) to a vantage point
    Add {
        /// Image file (PPM)
        file: Option<PathBuf>,

        /// Promote by hex hash instead of an image file
        #[arg(long, conflicts_with = "file")]
        hex: Option<String>,
    },

    /// Print a stored hash that would make a good vantage point
    Find {
        /// Candidate sample size (overrides config)
        #[arg(short, long)]
        sample: Option<usize>,
    },

    /// Grow the vantage point set to match the index size
    Auto {
        /// Target points per partition (overrides config)
        #[arg(short, long)]
        target: Option<i64>,
    },
}

fn main() {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let mut settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: invalid configuration: {e}");
            std::process::exit(ExitCode::ConfigError.into());
        }
    };
    if let Some(db) = &cli.db {
        settings.db_path = db.clone();
    }
    picdex::config::init_global_debug(settings.debug);

    let format = OutputFormat::from_json_flag(cli.json);
    let code = run(cli.command, &settings, format);
    std::process::exit(code.into());
}

fn run(command: Commands, settings: &Settings, format: OutputFormat) -> ExitCode {
    match command {
        Commands::Hash {
            files,
            algorithm,
            quiet,
        } => run_hash(files, algorithm.as_deref(), quiet, settings, format),
        Commands::Insert { files } => run_insert(files, settings, format),
        Commands::Query {
            file,
            hex,
            radius,
            limit,
        } => run_query(file, hex, radius, limit, settings, format),
        Commands::Vantage { action } => run_vantage(action, settings, format),
        Commands::Balance { vp_id } => run_balance(vp_id, settings, format),
        Commands::Stats => run_stats(settings, format),
        Commands::Rename { old, new } => {
            with_database(settings, format, |db| db.rename(&old, &new).map(|_| ()))
        }
        Commands::Remove { name } => {
            with_database(settings, format, |db| db.remove(&name).map(|_| ()))
        }
        Commands::Config => run_config(settings, format),
    }
}

/// Build the configured hasher and preprocessor
fn hashing_setup(
    settings: &Settings,
    algorithm: Option<&str>,
) -> Result<(Preprocess, Box<dyn Hasher>), HashError> {
    let name = algorithm.unwrap_or(&settings.hash.algorithm);
    let hasher = hash::create_hasher(name)?;
    Ok((Preprocess::new(settings.hash.preprocess_size), hasher))
}

fn open_database(settings: &Settings) -> Result<HashDatabase, IndexError> {
    let db = HashDatabase::open(&settings.db_path)?;
    db.check_hash_type(&settings.hash.algorithm)?;
    Ok(db)
}

fn report_index_error(err: &IndexError, format: OutputFormat) -> ExitCode {
    if format.is_json() {
        JsonResponse::<serde_json::Value>::from_index_error(err).print();
    } else {
        eprintln!("Error: {err}");
        for suggestion in err.recovery_suggestions() {
            eprintln!("  hint: {suggestion}");
        }
    }
    ExitCode::from_index_error(err)
}

fn report_hash_error(err: &HashError, format: OutputFormat) -> ExitCode {
    if format.is_json() {
        let response: JsonResponse = JsonResponse {
            status: "error".to_string(),
            code: "HASH_ERROR".to_string(),
            message: err.to_string(),
            data: None,
            suggestions: Vec::new(),
            exit_code: ExitCode::from_hash_error(err) as u8,
            meta: None,
        };
        response.print();
    } else {
        eprintln!("Error: {err}");
    }
    ExitCode::from_hash_error(err)
}

/// Open the database, run one operation, report the outcome
fn with_database<F>(settings: &Settings, format: OutputFormat, op: F) -> ExitCode
where
    F: FnOnce(&mut HashDatabase) -> Result<(), IndexError>,
{
    let mut db = match open_database(settings) {
        Ok(db) => db,
        Err(e) => return report_index_error(&e, format),
    };
    match op(&mut db) {
        Ok(()) => {
            if format.is_json() {
                JsonResponse::success(serde_json::json!({})).with_meta().print();
            } else {
                println!("ok");
            }
            ExitCode::Success
        }
        Err(e) => report_index_error(&e, format),
    }
}

fn run_hash(
    files: Vec<PathBuf>,
    algorithm: Option<&str>,
    quiet: bool,
    settings: &Settings,
    format: OutputFormat,
) -> ExitCode {
    let (prep, hasher) = match hashing_setup(settings, algorithm) {
        Ok(setup) => setup,
        Err(e) => return report_hash_error(&e, format),
    };

    let mut hashes: Vec<(String, String)> = Vec::new();
    let mut code = ExitCode::Success;

    if files.is_empty() {
        // Stream of concatenated PPMs on stdin
        let stdin = std::io::stdin();
        let mut reader = std::io::BufReader::new(stdin.lock());
        loop {
            match ppm::load_ppm(&mut reader) {
                Ok(Some(img)) => match hasher.hash(&prep.apply(&img)) {
                    Ok(h) => hashes.push((hash::hex_string(&h), String::new())),
                    Err(e) => return report_hash_error(&e, format),
                },
                Ok(None) => break,
                Err(e) => return report_hash_error(&e, format),
            }
        }
    } else {
        for file in &files {
            match hash::hash_ppm_file(file, &prep, hasher.as_ref()) {
                Ok(h) => hashes.push((hash::hex_string(&h), file.display().to_string())),
                Err(e) => {
                    report_hash_error(&e, OutputFormat::Text);
                    code = ExitCode::from_hash_error(&e);
                }
            }
        }
    }

    if format.is_json() {
        let data: Vec<serde_json::Value> = hashes
            .iter()
            .map(|(h, f)| serde_json::json!({"hash": h, "file": f}))
            .collect();
        JsonResponse::success(serde_json::json!(data)).with_meta().print();
    } else {
        for (h, f) in &hashes {
            if quiet || f.is_empty() {
                println!("{h}");
            } else {
                println!("{h} {f}");
            }
        }
    }
    code
}

fn run_insert(files: Vec<PathBuf>, settings: &Settings, format: OutputFormat) -> ExitCode {
    let (prep, hasher) = match hashing_setup(settings, None) {
        Ok(setup) => setup,
        Err(e) => return report_hash_error(&e, format),
    };
    let mut db = match open_database(settings) {
        Ok(db) => db,
        Err(e) => return report_index_error(&e, format),
    };

    let mut inserted = 0usize;
    let mut code = ExitCode::Success;
    for file in &files {
        let name = file.display().to_string();
        let h = match hash::hash_ppm_file(file, &prep, hasher.as_ref()) {
            Ok(h) => h,
            Err(e) => {
                report_hash_error(&e, OutputFormat::Text);
                code = ExitCode::from_hash_error(&e);
                continue;
            }
        };
        match db.insert(&h, &name) {
            Ok(_) => inserted += 1,
            Err(e) => {
                code = report_index_error(&e, OutputFormat::Text);
            }
        }
    }

    if format.is_json() {
        JsonResponse::success(serde_json::json!({"inserted": inserted}))
            .with_meta()
            .print();
    } else {
        println!("inserted {inserted} of {} files", files.len());
    }
    code
}

fn run_query(
    file: Option<PathBuf>,
    hex: Option<String>,
    radius: u32,
    limit: usize,
    settings: &Settings,
    format: OutputFormat,
) -> ExitCode {
    let query_hash = match (file, hex) {
        (Some(file), None) => {
            let (prep, hasher) = match hashing_setup(settings, None) {
                Ok(setup) => setup,
                Err(e) => return report_hash_error(&e, format),
            };
            match hash::hash_ppm_file(&file, &prep, hasher.as_ref()) {
                Ok(h) => h,
                Err(e) => return report_hash_error(&e, format),
            }
        }
        (None, Some(hex)) => match hash::parse_hex(&hex) {
            Ok(h) => h,
            Err(e) => return report_hash_error(&e, format),
        },
        _ => {
            eprintln!("Error: provide an image file or --hex");
            return ExitCode::GeneralError;
        }
    };

    let mut db = match open_database(settings) {
        Ok(db) => db,
        Err(e) => return report_index_error(&e, format),
    };
    let matches = match db.query(&query_hash, radius, limit) {
        Ok(matches) => matches,
        Err(e) => return report_index_error(&e, format),
    };

    if format.is_json() {
        JsonResponse::success(serde_json::json!(matches)).with_meta().print();
    } else if matches.is_empty() {
        println!("no matches within distance {radius}");
    } else {
        for m in &matches {
            println!("{:>4}  {}", m.distance, m.name);
        }
    }
    if matches.is_empty() {
        ExitCode::NotFound
    } else {
        ExitCode::Success
    }
}

fn run_vantage(action: VantageAction, settings: &Settings, format: OutputFormat) -> ExitCode {
    match action {
        VantageAction::Add { file, hex } => {
            let value = match (file, hex) {
                (Some(file), None) => {
                    let (prep, hasher) = match hashing_setup(settings, None) {
                        Ok(setup) => setup,
                        Err(e) => return report_hash_error(&e, format),
                    };
                    match hash::hash_ppm_file(&file, &prep, hasher.as_ref()) {
                        Ok(h) => h,
                        Err(e) => return report_hash_error(&e, format),
                    }
                }
                (None, Some(hex)) => match hash::parse_hex(&hex) {
                    Ok(h) => h,
                    Err(e) => return report_hash_error(&e, format),
                },
                _ => {
                    eprintln!("Error: provide an image file or --hex");
                    return ExitCode::GeneralError;
                }
            };
            with_database(settings, format, |db| {
                db.add_vantage_point(&value).map(|_| ())
            })
        }
        VantageAction::Find { sample } => {
            let sample = sample.unwrap_or(settings.index.vantage_sample_size);
            let db = match open_database(settings) {
                Ok(db) => db,
                Err(e) => return report_index_error(&e, format),
            };
            match db.find_vantage_point(sample) {
                Ok(value) => {
                    let hex = hash::hex_string(&value);
                    if format.is_json() {
                        JsonResponse::success(serde_json::json!({"hash": hex}))
                            .with_meta()
                            .print();
                    } else {
                        println!("{hex}");
                    }
                    ExitCode::Success
                }
                Err(e) => report_index_error(&e, format),
            }
        }
        VantageAction::Auto { target } => {
            let target = target.unwrap_or(settings.index.auto_vantage_target);
            let mut db = match open_database(settings) {
                Ok(db) => db,
                Err(e) => return report_index_error(&e, format),
            };
            match db.auto_vantage_point(target) {
                Ok(count) => {
                    if format.is_json() {
                        JsonResponse::success(serde_json::json!({"vantage_points": count}))
                            .with_meta()
                            .print();
                    } else {
                        println!("vantage points: {count}");
                    }
                    ExitCode::Success
                }
                Err(e) => report_index_error(&e, format),
            }
        }
    }
}

fn run_balance(vp_id: Option<i64>, settings: &Settings, format: OutputFormat) -> ExitCode {
    let min_count = settings.index.balance_min_count;
    let threshold = settings.index.balance_threshold;
    with_database(settings, format, |db| match vp_id {
        Some(id) => db.balance(id),
        None => db.auto_balance(min_count, threshold),
    })
}

fn run_stats(settings: &Settings, format: OutputFormat) -> ExitCode {
    let db = match open_database(settings) {
        Ok(db) => db,
        Err(e) => return report_index_error(&e, format),
    };
    match db.stats() {
        Ok(stats) => {
            if format.is_json() {
                JsonResponse::success(serde_json::json!(stats)).with_meta().print();
            } else {
                println!("points:         {}", stats.points);
                println!("vantage points: {}", stats.vantage_points);
                println!("items:          {}", stats.items);
            }
            ExitCode::Success
        }
        Err(e) => report_index_error(&e, format),
    }
}

fn run_config(settings: &Settings, format: OutputFormat) -> ExitCode {
    if format.is_json() {
        JsonResponse::success(serde_json::json!(settings)).with_meta().print();
        return ExitCode::Success;
    }
    match toml::to_string_pretty(settings) {
        Ok(text) => {
            println!("{text}");
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error: failed to render settings: {e}");
            ExitCode::GeneralError
        }
    }
}

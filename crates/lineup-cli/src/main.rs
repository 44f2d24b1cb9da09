use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use lineup_core::policy::DEFAULT_DISTANCE_THRESHOLD;
use lineup_core::{resolve, DirectoryGallery, GalleryProvider, IdentifyResponse, MatchPolicy, PersonRecord};
use lineup_embed::{ArcFaceEmbedder, DistanceMetric, EmbeddingComparator, ARCFACE_MODEL_FILE};
use lineup_store::SqliteRecordStore;
use std::path::{Path, PathBuf};

// `#[zbus::proxy]` generates `LineupProxy` (async) and `LineupProxyBlocking`.
#[zbus::proxy(
    interface = "org.lineup.Lineup1",
    default_service = "org.lineup.Lineup1",
    default_path = "/org/lineup/Lineup1"
)]
trait Lineup {
    async fn identify(&self, image: &[u8]) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn list_gallery(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "lineup", about = "Lineup face identification CLI")]
struct Cli {
    /// Talk to lineupd on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    /// Record database path (default: $LINEUP_DB_PATH or the data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the person in an image via the daemon
    Identify {
        image: PathBuf,
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Show daemon status
    Status,
    /// List gallery entries known to the daemon
    Gallery,
    /// Manage person records
    Records {
        #[command(subcommand)]
        action: RecordsCommand,
    },
    /// Identify locally without the daemon (diagnostics)
    Scan {
        image: PathBuf,
        /// Gallery directory (default: $LINEUP_GALLERY_DIR or the data directory)
        #[arg(long)]
        gallery: Option<PathBuf>,
        /// Directory containing w600k_r50.onnx
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Distance threshold (default: $LINEUP_DISTANCE_THRESHOLD or 0.40)
        #[arg(long)]
        threshold: Option<f32>,
        /// Distance metric: cosine or euclidean_l2 (default: $LINEUP_METRIC or cosine)
        #[arg(long)]
        metric: Option<DistanceMetric>,
        /// Also require the comparator's verdict (default: $LINEUP_REQUIRE_VERIFIED)
        #[arg(long)]
        require_verified: bool,
    },
}

#[derive(Subcommand)]
enum RecordsCommand {
    /// Create the records table if it does not exist
    Init,
    /// Add a person record
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: u32,
        #[arg(long)]
        gender: String,
        /// Comma-separated offense list
        #[arg(long, default_value = "")]
        crimes: String,
        #[arg(long)]
        status: String,
        #[arg(long)]
        address: String,
        /// Release date (YYYY-MM-DD)
        #[arg(long)]
        release_date: Option<NaiveDate>,
    },
    /// List all records
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.clone().unwrap_or_else(|| {
        env_path("LINEUP_DB_PATH").unwrap_or_else(|| lineup_core::data_dir().join("records.db"))
    });

    match cli.command {
        Commands::Identify { image, json } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let proxy = connect(cli.session).await?;
            let raw = proxy.identify(&bytes).await.context("Identify call failed")?;
            if json {
                println!("{raw}");
            } else {
                let response: IdentifyResponse =
                    serde_json::from_str(&raw).context("malformed response from lineupd")?;
                print_response(&response);
            }
        }
        Commands::Status => {
            let proxy = connect(cli.session).await?;
            let raw = proxy.status().await?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Gallery => {
            let proxy = connect(cli.session).await?;
            let raw = proxy.list_gallery().await?;
            let entries: Vec<lineup_core::GalleryEntry> = serde_json::from_str(&raw)?;
            if entries.is_empty() {
                println!("Gallery is empty");
            }
            for entry in entries {
                println!("{:<32} {}", entry.identifier, entry.reference_image.display());
            }
        }
        Commands::Records { action } => run_records(&db_path, action)?,
        Commands::Scan {
            image,
            gallery,
            model_dir,
            threshold,
            metric,
            require_verified,
        } => {
            let gallery_dir = gallery.unwrap_or_else(|| {
                env_path("LINEUP_GALLERY_DIR").unwrap_or_else(|| lineup_core::data_dir().join("gallery"))
            });
            let model_dir = model_dir
                .or_else(|| env_path("LINEUP_MODEL_DIR"))
                .unwrap_or_else(lineup_embed::default_model_dir);
            let settings = ScanSettings::resolve(threshold, metric, require_verified, |key| {
                std::env::var(key).ok()
            });
            let response = scan_locally(&image, &gallery_dir, &model_dir, &db_path, &settings)?;
            print_response(&response);
        }
    }

    Ok(())
}

async fn connect(session: bool) -> Result<LineupProxy<'static>> {
    let connection = if session {
        zbus::Connection::session().await?
    } else {
        zbus::Connection::system().await?
    };
    LineupProxy::new(&connection)
        .await
        .context("lineupd is not reachable on D-Bus")
}

fn run_records(db_path: &Path, action: RecordsCommand) -> Result<()> {
    let store = SqliteRecordStore::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    match action {
        RecordsCommand::Init => {
            store.init_schema()?;
            println!("Record database ready at {}", db_path.display());
        }
        RecordsCommand::Add {
            name,
            age,
            gender,
            crimes,
            status,
            address,
            release_date,
        } => {
            let record = PersonRecord {
                name,
                age,
                gender,
                crimes: crimes
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect(),
                status,
                last_known_address: address,
                release_date,
            };
            let id = store.insert(&record)?;
            println!("Added record {id}: {}", record.name);
        }
        RecordsCommand::List => {
            let records = store.list()?;
            if records.is_empty() {
                println!("No records");
            }
            for r in records {
                let release = r
                    .release_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "N/A".into());
                println!(
                    "{:<28} {:>3}  {:<8} {:<16} {}  [{}]",
                    r.name,
                    r.age,
                    r.gender,
                    r.status,
                    release,
                    r.crimes.join(", ")
                );
            }
        }
    }
    Ok(())
}

/// Comparator and policy settings for a local scan, matching the daemon's
/// `LINEUP_*` defaults when flags are absent.
#[derive(Debug, PartialEq)]
struct ScanSettings {
    threshold: f32,
    metric: DistanceMetric,
    policy: MatchPolicy,
}

impl ScanSettings {
    fn resolve(
        threshold: Option<f32>,
        metric: Option<DistanceMetric>,
        require_verified: bool,
        get: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let threshold = threshold
            .or_else(|| get("LINEUP_DISTANCE_THRESHOLD").and_then(|v| v.parse().ok()))
            .unwrap_or(DEFAULT_DISTANCE_THRESHOLD);
        let metric = metric
            .or_else(|| get("LINEUP_METRIC").and_then(|v| v.parse().ok()))
            .unwrap_or(DistanceMetric::Cosine);
        let require_verified =
            require_verified || get("LINEUP_REQUIRE_VERIFIED").is_some_and(|v| v != "0");
        Self {
            threshold,
            metric,
            policy: MatchPolicy::for_distance(threshold, require_verified),
        }
    }
}

fn scan_locally(
    image: &Path,
    gallery_dir: &Path,
    model_dir: &Path,
    db_path: &Path,
    settings: &ScanSettings,
) -> Result<IdentifyResponse> {
    let embedder = ArcFaceEmbedder::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
    let comparator = EmbeddingComparator::new(embedder, settings.metric, settings.threshold);
    let entries = DirectoryGallery::new(gallery_dir).list_entries()?;
    println!("Scanning {} gallery entries...", entries.len());

    let report = lineup_core::scan(image, &entries, &comparator, &settings.policy);
    println!(
        "compared {}, qualified {}, failed {}",
        report.stats.compared, report.stats.qualified, report.stats.failures
    );

    let store = SqliteRecordStore::open(db_path)?;
    Ok(IdentifyResponse::from(resolve(report.outcome, &store)))
}

fn print_response(response: &IdentifyResponse) {
    match response {
        IdentifyResponse::MatchFound { confidence, message, .. } => {
            println!("Match found (confidence {confidence:.2})");
            println!("{message}");
        }
        IdentifyResponse::MatchWithoutRecord {
            identifier,
            confidence,
            message,
        } => {
            println!("Matched '{identifier}' (confidence {confidence:.2})");
            println!("{message}");
        }
        IdentifyResponse::NoMatch { message } => println!("{message}"),
        IdentifyResponse::Error { message } => eprintln!("error: {message}"),
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

//! HatBot: sales proposal assistant server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use hatbot_core::{HatbotConfig, LlmConfig};
use hatbot_ingest::Ingester;
use hatbot_server::{build_router, AppState, LlmRuntime};
use hatbot_store::SqliteStore;

fn resolve_data_dir() -> PathBuf {
    std::env::var("HATBOT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_help() {
    println!("HatBot: sales proposal assistant");
    println!();
    println!("Usage: hatbot [command]");
    println!();
    println!("Commands:");
    println!("  (none)                   Start the server");
    println!("  ingest <path>...         Index files or directories for retrieval");
    println!("  check-config [file]      Validate the provider configuration");
    println!("  help                     Show this help message");
}

fn run_ingest(config: &HatbotConfig, paths: &[String]) -> anyhow::Result<bool> {
    let store = SqliteStore::open(&config.data_paths.vectordb)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
    let ingester = Ingester::new(&store);

    let mut ok = true;
    for path in paths {
        match ingester.ingest_path(Path::new(path)) {
            Ok(report) => println!(
                "{}: {} ingested, {} chunks, {} duplicates, {} skipped, {} failed",
                path, report.ingested, report.chunks, report.duplicates, report.skipped, report.failed
            ),
            Err(e) => {
                eprintln!("{}: {}", path, e);
                ok = false;
            }
        }
    }
    Ok(ok)
}

fn check_config(path: &Path) -> bool {
    let runtime = match LlmConfig::load(path).and_then(LlmRuntime::build) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {}", path.display(), e);
            return false;
        }
    };

    println!(
        "{}: mode={}, {} models registered",
        path.display(),
        runtime.config.selection,
        runtime.factory.len()
    );
    for candidate in runtime.scheduler.candidates() {
        println!("  {} (weight {})", candidate.id, candidate.weight);
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let data_dir = resolve_data_dir();

    // Handle CLI subcommands
    if args.len() > 1 {
        match args[1].as_str() {
            "ingest" => {
                if args.len() < 3 {
                    eprintln!("Usage: hatbot ingest <path>...");
                    std::process::exit(1);
                }
                let config = HatbotConfig::from_env(&data_dir)?;
                let ok = run_ingest(&config, &args[2..])?;
                std::process::exit(if ok { 0 } else { 1 });
            }
            "check-config" => {
                let path = match args.get(2) {
                    Some(file) => PathBuf::from(file),
                    None => HatbotConfig::from_env(&data_dir)?.config_file,
                };
                std::process::exit(if check_config(&path) { 0 } else { 1 });
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'hatbot help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    // Normal server startup
    info!("Data directory: {}", data_dir.display());

    let config = HatbotConfig::from_env(&data_dir)?;
    let port = config.port;

    let llm_config = LlmConfig::load(&config.config_file)
        .map_err(|e| anyhow::anyhow!("Failed to load provider config: {}", e))?;

    let state = Arc::new(
        AppState::new(config, llm_config)
            .map_err(|e| anyhow::anyhow!("Failed to initialize: {}", e))?,
    );
    info!(
        "Retriever: {}",
        state
            .retrievers
            .retriever_or_fallback(&state.config.db_type)
            .kind()
    );

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HatBot server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

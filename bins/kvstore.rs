use dotenvy::dotenv;
use service::KeyValueStore;
use tracing::{error, info};

fn init_logging() {
    // Load .env first so RUST_LOG / LOG_FORMAT take effect
    dotenv().ok();
    common::utils::logging::init_logging_from_env();
    info!(service = "kvstore", event = "logger_init", "tracing subscriber initialized");
}

enum Command {
    Dump,
    Get(String),
    Set(String, serde_json::Value),
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    match args.next().as_deref() {
        None | Some("dump") => Ok(Command::Dump),
        Some("get") => {
            let key = args.next().ok_or_else(|| anyhow::anyhow!("usage: kvstore get <key>"))?;
            Ok(Command::Get(key))
        }
        Some("set") => {
            let key = args.next().ok_or_else(|| anyhow::anyhow!("usage: kvstore set <key> <json>"))?;
            let raw = args.next().ok_or_else(|| anyhow::anyhow!("usage: kvstore set <key> <json>"))?;
            let value = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("value for {key} is not valid JSON: {e}"))?;
            Ok(Command::Set(key, value))
        }
        Some(other) => Err(anyhow::anyhow!("unknown command {other:?}; expected dump, get or set")),
    }
}

/// Pretty JSON for a stored value. A missing key is an error, so it cannot be
/// confused with a stored `null`.
fn render_value(key: &str, value: Option<serde_json::Value>) -> anyhow::Result<String> {
    let value = value.ok_or_else(|| anyhow::anyhow!("key {key:?} not found"))?;
    Ok(serde_json::to_string_pretty(&value)?)
}

async fn run(store: &KeyValueStore, command: Command) -> anyhow::Result<()> {
    let mirror = store.initialize().await?;
    info!(service = "kvstore", event = "ready", keys = mirror.len(), "store initialized");

    match command {
        Command::Dump => println!("{}", serde_json::to_string_pretty(&mirror)?),
        Command::Get(key) => println!("{}", render_value(&key, store.get(&key).await)?),
        Command::Set(key, value) => {
            store.update(&key, value).await?;
            info!(service = "kvstore", event = "updated", %key, "value written");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_logging();

    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");
    info!(service = "kvstore", event = "start", pid, version, "kvstore starting");

    let command = match parse_args(std::env::args().skip(1)) {
        Ok(c) => c,
        Err(e) => {
            error!(service = "kvstore", event = "bad_args", error = %e, "invalid arguments");
            return std::process::ExitCode::from(2);
        }
    };

    let cfg = match configs::AppConfig::load_and_validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(service = "kvstore", event = "config_invalid", error = %e, "configuration rejected");
            return std::process::ExitCode::FAILURE;
        }
    };

    let store = KeyValueStore::from_config(&cfg);
    let outcome = run(&store, command).await;
    store.shutdown().await;

    match outcome {
        Ok(()) => {
            info!(service = "kvstore", event = "stop", pid, "kvstore finished");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            error!(service = "kvstore", event = "run_failed", error = %e, "kvstore failed");
            std::process::ExitCode::FAILURE
        }
    }
}

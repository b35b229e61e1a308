use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "buyrent",
    version,
    about = "Buy-versus-rent net worth projections over a JSON HTTP API"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Log filter, e.g. info or buyrent=debug; overrides RUST_LOG"
    )]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("buyrent=info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Command::Serve { port } => {
            if let Err(e) = buyrent::api::run_http_server(port).await {
                tracing::error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
    }
}

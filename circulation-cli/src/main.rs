mod server;
mod handlers;

use clap::{Args, Parser, Subcommand};

use circulation_core::policy::CirculationPolicy;

#[derive(Parser)]
#[command(
    name = "circulation",
    about = "Circulation: loans, reservations and fines for a lending library",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the circulation HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3200")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Storage backend: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "CIRCULATION_STORAGE")]
        storage: String,

        /// JSON file listing `{ "book_id", "total_copies" }` entries
        #[arg(long, env = "CIRCULATION_CATALOG")]
        catalog: Option<String>,

        /// Seconds between background expiry sweeps (0 disables)
        #[arg(long, default_value = "300", env = "CIRCULATION_SWEEP_INTERVAL")]
        sweep_interval: u64,

        /// Requests served at once before new ones queue
        #[arg(long, default_value = "256")]
        max_concurrent_requests: usize,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Print the effective lending policy as JSON
    Policy {
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Print version information
    Version,
}

#[derive(Args)]
struct PolicyArgs {
    /// Days from borrow to due date
    #[arg(long, default_value_t = CirculationPolicy::DEFAULT_LOAN_PERIOD_DAYS, env = "CIRCULATION_LOAN_DAYS")]
    loan_days: u32,

    /// Fine per full overdue day, in cents
    #[arg(long, default_value_t = CirculationPolicy::DEFAULT_DAILY_FINE_CENTS, env = "CIRCULATION_DAILY_FINE_CENTS")]
    daily_fine_cents: u64,

    /// Days a queued reservation waits before expiring
    #[arg(long, default_value_t = CirculationPolicy::DEFAULT_RESERVATION_WINDOW_DAYS, env = "CIRCULATION_RESERVATION_DAYS")]
    reservation_days: u32,
}

impl From<PolicyArgs> for CirculationPolicy {
    fn from(args: PolicyArgs) -> Self {
        CirculationPolicy {
            loan_period_days: args.loan_days,
            daily_fine_cents: args.daily_fine_cents,
            reservation_window_days: args.reservation_days,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            storage,
            catalog,
            sweep_interval,
            max_concurrent_requests,
            policy,
        } => {
            let options = server::ServeOptions {
                host,
                port,
                storage,
                catalog,
                sweep_interval,
                max_concurrent_requests,
                policy: policy.into(),
            };
            if let Err(e) = server::run(options).await {
                tracing::error!("Server stopped: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Policy { policy } => {
            let policy: CirculationPolicy = policy.into();
            match serde_json::to_string_pretty(&policy) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Failed to render policy: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Version => {
            println!("circulation {}", env!("CARGO_PKG_VERSION"));
            println!("Loan and reservation kernel for lending libraries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        let command = Cli::command();
        command.clone().debug_assert();

        let about = command.get_about().map(|a| a.to_string()).unwrap_or_default();
        assert!(about.is_ascii(), "help text should be plain ASCII: {about}");
    }
}

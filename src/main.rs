use agristore::core::config::Config;
use agristore::database::{DatabaseManager, MongoDb};
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};

#[derive(Parser)]
#[clap(author, version, about = "Storage tooling for the farming advice service")]
struct Cli {
    /// Path to config file
    #[clap(short, long, default_value = "agristore.toml")]
    config: String,

    /// Debug mode
    #[clap(short, long)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and report which store is active
    Status,

    /// Ping MongoDB, list its collections and try a write
    CheckConnection,

    /// Print a user's growing activities as JSON
    Activities {
        /// Owning user id
        #[clap(long)]
        user: String,

        /// Only activities in this status
        #[clap(long, default_value = "active")]
        status: String,

        /// Ignore the status filter
        #[clap(long)]
        all: bool,
    },

    /// Print a user's dashboard notifications as JSON
    Notifications {
        /// Owning user id
        #[clap(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .target(env_logger::Target::Stdout)
        .init();

    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Status => {
            let manager = DatabaseManager::connect(&config).await?;
            println!("Active store: {}", manager.backend());
        }
        Command::CheckConnection => {
            if !check_connection(&config).await {
                std::process::exit(1);
            }
        }
        Command::Activities { user, status, all } => {
            let manager = DatabaseManager::connect(&config).await?;
            let status = if all { None } else { Some(status.as_str()) };
            let activities = manager.get_user_growing_activities(&user, status).await?;
            info!("Found {} growing activities for user {}", activities.len(), user);
            println!("{}", serde_json::to_string_pretty(&activities)?);
        }
        Command::Notifications { user } => {
            let manager = DatabaseManager::connect(&config).await?;
            let notifications = manager.get_dashboard_notifications(&user).await?;
            println!("{}", serde_json::to_string_pretty(&notifications)?);
        }
    }

    Ok(())
}

/// Run the connection diagnostics, returning whether the server was reachable
async fn check_connection(config: &Config) -> bool {
    println!("Testing MongoDB connection...");
    println!("Connection URI: {}", redact_credentials(&config.mongodb.connection_string));

    let mongo = match MongoDb::connect(&config.mongodb).await {
        Ok(mongo) => mongo,
        Err(e) => {
            println!("Connection failed: {}", e);
            println!();
            println!("Troubleshooting steps:");
            println!("   1. Verify your MongoDB credentials");
            println!("   2. Check that your IP address is allowed by the cluster");
            println!("   3. Ensure the cluster is running");
            println!("   4. Verify network connectivity");
            return false;
        }
    };

    println!("Successfully connected to MongoDB!");
    println!("Using database: {}", mongo.database_name());

    match mongo.collection_names().await {
        Ok(names) if names.is_empty() => println!("Available collections: None (empty database)"),
        Ok(names) => println!("Available collections: {}", names.join(", ")),
        Err(e) => println!("Could not list collections: {}", e),
    }

    match mongo.write_probe().await {
        Ok(id) => println!("Write test successful, probe {} cleaned up", id),
        Err(e) => {
            println!("Write operation failed: {}", e);
            println!("   This may be expected for read-only endpoints");
        }
    }

    mongo.shutdown().await;
    println!("Connection test completed successfully!");
    true
}

/// Hide the user-info part of a connection string
fn redact_credentials(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end + 3 => {
            format!("{}***{}", &uri[..scheme_end + 3], &uri[at..])
        }
        _ => uri.to_string(),
    }
}

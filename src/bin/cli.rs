//! FrostKV CLI Client
//!
//! Command-line interface for interacting with a FrostKV server.
//!
//! ## Connection Handling
//!
//! Uses a single TCP stream for sequential write-then-read through a
//! `Connector`, the same discipline the connector pool enforces.

use clap::{Parser, Subcommand};

use frostkv::Connector;

/// FrostKV CLI
#[derive(Parser, Debug)]
#[command(name = "frostkv-cli")]
#[command(about = "CLI for the FrostKV frozen key-value store")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "9450")]
    port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Health-check the server
    Ping,

    /// Declare a collection
    Create {
        /// Collection name
        collection: String,

        /// Primary key name (unique)
        primary_key: String,

        /// Additional index names
        #[arg(long = "index")]
        other_indexes: Vec<String>,
    },

    /// Drop a collection
    Drop {
        /// Collection name
        collection: String,
    },

    /// Describe all collections
    Describe,

    /// Look up documents by primary key
    Query {
        /// Collection name
        collection: String,

        /// Primary key values
        keys: Vec<i64>,
    },
}

fn main() {
    let args = Args::parse();

    let mut connector = match Connector::connect(&args.host, args.port) {
        Ok(connector) => connector,
        Err(e) => {
            eprintln!("Failed to connect to {}:{}: {}", args.host, args.port, e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Commands::Ping => {
            if connector.ping() {
                println!("PONG");
                Ok(())
            } else {
                eprintln!("No answer");
                std::process::exit(1);
            }
        }
        Commands::Create {
            collection,
            primary_key,
            other_indexes,
        } => connector
            .create_collection(&collection, &primary_key, &other_indexes)
            .map(|_| println!("Created '{}'", collection)),
        Commands::Drop { collection } => connector
            .drop_collection(&collection)
            .map(|_| println!("Dropped '{}'", collection)),
        Commands::Describe => connector.get_collections_description().map(|collections| {
            if collections.is_empty() {
                println!("(no collections)");
            }
            for (name, info) in collections {
                println!(
                    "{}: {} objects, {} bytes, version {}, keys [{}]",
                    name,
                    info.count,
                    info.size_in_bytes,
                    info.last_version.as_deref().unwrap_or("<none>"),
                    info.key_names.join(", ")
                );
            }
        }),
        Commands::Query { collection, keys } => connector
            .query_by_primary_key(&collection, &keys)
            .map(|objects| {
                println!("{} object(s)", objects.len());
                for (i, data) in objects.iter().enumerate() {
                    println!("  [{}] {} bytes", i, data.len());
                }
            }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

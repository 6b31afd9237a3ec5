use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use labtrack_store::types::StationStatus;
use labtrack_store::Store;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "labtrack", about = "labtrack lab administration CLI")]
struct Cli {
    /// Path to the SQLite database (default: $LABTRACK_DB_PATH).
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the active roster
    Roster {
        /// Restrict to one grade (e.g. "7A")
        #[arg(short, long)]
        grade: Option<String>,
    },
    /// Manage lab stations
    Stations {
        #[command(subcommand)]
        command: StationCommands,
    },
    /// List students still holding a station
    Pending,
    /// Show the occupied-station count
    Occupied,
}

#[derive(Subcommand)]
enum StationCommands {
    /// List stations and their states
    List,
    /// Register new stations with sequential E-NN codes
    Add {
        /// How many stations to add
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
    /// Set a station's state (disponible, ocupado, dañado)
    SetStatus { code: String, status: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = match cli.db {
        Some(path) => path,
        None => std::env::var("LABTRACK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("labtrack.db")),
    };
    let store = Store::open(&db_path)?;

    match cli.command {
        Commands::Roster { grade } => {
            let roster = store.load_roster(grade.as_deref())?;
            if roster.is_empty() {
                println!("no active enrollments");
            }
            for entry in roster {
                let photo = if entry.photo.is_some() { "photo" } else { "no photo" };
                println!("{:>6}  {}  ({photo})", entry.student_id, entry.display_name);
            }
        }
        Commands::Stations { command } => match command {
            StationCommands::List => {
                for station in store.list_stations()? {
                    println!("{}  {}", station.code, station.status.as_literal());
                }
            }
            StationCommands::Add { count } => {
                for _ in 0..count {
                    println!("registered {}", store.add_station()?);
                }
            }
            StationCommands::SetStatus { code, status } => {
                let Some(status) = StationStatus::from_literal(&status) else {
                    bail!("unknown status {status:?} (want disponible, ocupado or dañado)");
                };
                if store.slot_status(&code)?.is_none() {
                    bail!("no station {code}");
                }
                store.set_slot_status(&code, status)?;
                println!("{code} -> {}", status.as_literal());
            }
        },
        Commands::Pending => {
            let pending = store.pending_exits()?;
            if pending.is_empty() {
                println!("no pending exits");
            }
            for name in pending {
                println!("{name}");
            }
        }
        Commands::Occupied => {
            println!("{}", store.occupied_count()?);
        }
    }

    Ok(())
}

//! varpack CLI
//!
//! Inspect and edit a variable package from the command line.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use varpack::{Config, EntryKind, Result, Store, Value};

/// varpack CLI
#[derive(Parser, Debug)]
#[command(name = "varpack")]
#[command(about = "Paged package store for calculator variables")]
#[command(version)]
struct Args {
    /// Landing directory holding packages
    #[arg(short, long, default_value = "./varpack_data")]
    data_dir: String,

    /// Package directory name
    #[arg(short, long, default_value = "usr")]
    package: String,

    /// Package id
    #[arg(long, default_value = "0")]
    package_id: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List entries with their keys and values
    List,

    /// Print the value of an entry
    Get {
        /// Entry name
        name: String,
    },

    /// Add a new entry
    Add {
        /// Entry name
        name: String,

        /// Value, e.g. `3.4`, `[1, 2]` or `[[1, 2], [3, 4]]`
        value: String,

        /// Store as an environment binding instead of a variable
        #[arg(long)]
        env: bool,

        /// Load this entry whenever the package is opened
        #[arg(long)]
        immediate: bool,
    },

    /// Replace the value of an existing entry
    Set {
        /// Entry name
        name: String,

        /// New value
        value: String,
    },

    /// Remove an entry and free its pages
    Remove {
        /// Entry name
        name: String,
    },

    /// Show package header and page usage
    Info,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,varpack=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .package_name(&args.package)
        .package_id(args.package_id)
        .build();

    let mut store = Store::open(config)?;

    match args.command {
        Commands::List => {
            for line in list_lines(&mut store)? {
                println!("{}", line);
            }
        }

        Commands::Get { name } => {
            let id = entry_id(&store, &name)?;
            println!("{}", store.entry_value(id)?);
        }

        Commands::Add {
            name,
            value,
            env,
            immediate,
        } => {
            let value: Value = value.parse()?;
            let kind = if env {
                EntryKind::Environment
            } else {
                EntryKind::Variable
            };
            let key = store.add_entry(&name, kind, value)?;
            if immediate {
                store.get_mut(key.entry_id)?.index_mut().set_load_immediate(true);
                store.save()?;
            }
            println!("{}", key);
        }

        Commands::Set { name, value } => {
            let id = entry_id(&store, &name)?;
            store.set_entry_value(id, value.parse()?)?;
            store.save()?;
        }

        Commands::Remove { name } => {
            let id = entry_id(&store, &name)?;
            store.remove_entry(id)?;
        }

        Commands::Info => {
            let header = store.header();
            println!("package:  {}", store.root().display());
            println!("id:       {}", store.package_id());
            println!("version:  {}", header.version());
            println!("author:   {}", header.author().unwrap_or("-"));
            println!("locked:   {}", header.is_locked());
            println!("entries:  {}", store.len());

            let pager = store.pager().lock();
            println!(
                "pages:    {} ({} free, {} bytes each)",
                pager.page_count(),
                pager.free_pages().len(),
                pager.page_bytes()
            );
            println!("fragmented: {}", pager.is_fragmented());
        }
    }

    Ok(())
}

fn entry_id(store: &Store, name: &str) -> Result<u64> {
    Ok(store.resolve(name)?.key().entry_id)
}

/// One line per entry. An entry whose value fails to load shows the error instead.
fn list_lines(store: &mut Store) -> Result<Vec<String>> {
    let ids: Vec<u64> = store.entries().map(|entry| entry.key().entry_id).collect();
    let mut lines = Vec::with_capacity(ids.len());

    for id in ids {
        let value = match store.entry_value(id) {
            Ok(value) => value.to_string(),
            Err(e) => format!("error: {}", e),
        };
        let entry = store.get(id)?;
        lines.push(format!(
            "{:<8} {:<16} {:<4} {}",
            entry.key(),
            entry.name(),
            entry.kind(),
            value
        ));
    }

    Ok(lines)
}

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use tagsift::config::Config;
use tagsift::db::{SqliteDb, TagCatalog};
use tagsift::export::{self, ExportFormat};
use tagsift::hashing;
use tagsift::logging::{self, LogOptions};
use tagsift::search::{EntityKind, ImageCountCache, PageMenu, SearchEngine, SearchResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Parse,
    Images,
    Collections,
    Adjacent(u64),
    Random,
    Export(PathBuf),
    Hash,
    Stats,
}

#[derive(Debug, Default)]
struct CliArgs {
    command: Option<Command>,
    query: Vec<String>,
    config_path: Option<PathBuf>,
    user: Option<String>,
    start: u64,
    stride: Option<u64>,
    collections: bool,
    verbose: bool,
}

fn value_after(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires an argument", flag);
            std::process::exit(1);
        }
    }
}

fn number_after(args: &[String], i: usize, flag: &str) -> u64 {
    let raw = value_after(args, i, flag);
    match raw.parse() {
        Ok(n) => n,
        Err(_) => {
            eprintln!("Error: {} expects a non-negative number, got '{}'", flag, raw);
            std::process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("tagsift {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                cli.config_path = Some(PathBuf::from(value_after(&args, i, "--config")));
                i += 1;
            }
            "--user" | "-u" => {
                cli.user = Some(value_after(&args, i, "--user"));
                i += 1;
            }
            "--start" => {
                cli.start = number_after(&args, i, "--start");
                i += 1;
            }
            "--stride" => {
                cli.stride = Some(number_after(&args, i, "--stride"));
                i += 1;
            }
            "--collections" => {
                cli.collections = true;
            }
            "--verbose" | "-v" => {
                cli.verbose = true;
            }
            word if cli.command.is_none() => {
                cli.command = Some(match word {
                    "parse" => Command::Parse,
                    "images" => Command::Images,
                    "collections" => Command::Collections,
                    "adjacent" => Command::Adjacent(number_after(&args, i, "adjacent")),
                    "random" => Command::Random,
                    "export" => Command::Export(PathBuf::from(value_after(&args, i, "export"))),
                    "hash" => Command::Hash,
                    "stats" => Command::Stats,
                    _ => {
                        eprintln!("Unknown command: {}", word);
                        print_help();
                        std::process::exit(1);
                    }
                });
                if matches!(word, "adjacent" | "export") {
                    i += 1;
                }
            }
            // Everything after the command is query text, including "-tag"
            word => cli.query.push(word.to_string()),
        }
        i += 1;
    }

    cli
}

fn print_help() {
    println!(
        r#"tagsift - tag query and search tool for an image catalog

USAGE:
    tagsift [OPTIONS] <COMMAND> [QUERY...]

COMMANDS:
    parse QUERY           Show the predicates a query resolves to
    images QUERY          Search images
    collections QUERY     Search collections
    adjacent ID QUERY     Previous and next matching image around ID
    random QUERY          Pick a random matching image
    export PATH QUERY     Write all matches to PATH (.csv or .json)
    hash                  Compute perceptual hashes for unhashed images
    stats                 Show catalog totals

OPTIONS:
    --config, -c PATH     Path to config file
    --user, -u NAME       Fold in NAME's stored search filter
    --start N             Zero-based result offset (default: 0)
    --stride N            Page size, 0 for everything (default: from config)
    --collections         Make parse/export work on collections
    --verbose, -v         Log to stderr (debug level unless TAGSIFT_LOG is set)
    --version, -V         Show version
    --help, -h            Show this help message

ENVIRONMENT:
    TAGSIFT_CONFIG        Path to config file (overrides default location)
    TAGSIFT_LOG           Log level (trace, debug, info, warn, error)

Queries: words are tags, "-tag" excludes, "quoted words" form one tag,
name:value is a metatag (rating:safe, score:>5, uploader:NAME, tagcount:<3,
incollection:yes, ordersimilar:ID, name:TEXT, location:TEXT)."#
    );
}

fn main() -> Result<()> {
    let cli = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let log_options = LogOptions {
        stderr: cli.verbose,
        dir: None,
    };
    if let Err(e) = logging::init(log_options) {
        eprintln!("Warning: logging unavailable: {}", e);
    }

    let config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = SqliteDb::open(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    db.initialize()?;

    let Some(command) = cli.command.clone() else {
        print_help();
        std::process::exit(1);
    };

    run(&cli, command, &config, &db)
}

fn run(cli: &CliArgs, command: Command, config: &Config, db: &SqliteDb) -> Result<()> {
    let engine = SearchEngine::new(db);
    let query = cli.query.join(" ");
    let stride = cli.stride.unwrap_or(config.search.page_stride);
    let kind = match command {
        Command::Collections => EntityKind::Collection,
        _ if cli.collections => EntityKind::Collection,
        _ => EntityKind::Image,
    };

    let user_id = match &cli.user {
        Some(name) => match db.user_id_by_name(name)? {
            Some(id) => Some(id),
            None => bail!("unknown user '{}'", name),
        },
        None => None,
    };

    match command {
        Command::Parse => {
            for pred in engine.query_with_user_filter(&query, user_id, kind)? {
                let origin = if pred.from_user_filter { "  (filter)" } else { "" };
                println!("{}{}", pred, origin);
            }
        }
        Command::Images => {
            let preds = engine.query_with_user_filter(&query, user_id, EntityKind::Image)?;
            let result = engine.search_images(&preds, cli.start, stride)?;
            for image in &result.items {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    image.id, image.name, image.location, image.rating, image.score_average
                );
            }
            print_footer(&result, cli.start);
        }
        Command::Collections => {
            let preds = engine.query_with_user_filter(&query, user_id, EntityKind::Collection)?;
            let result = engine.search_collections(&preds, cli.start, stride)?;
            for collection in &result.items {
                println!(
                    "{}\t{}\t{} images\t{}",
                    collection.id,
                    collection.name,
                    collection.members,
                    collection.preview_location.as_deref().unwrap_or("-")
                );
            }
            print_footer(&result, cli.start);
        }
        Command::Adjacent(pivot) => {
            let preds = engine.query_with_user_filter(&query, user_id, EntityKind::Image)?;
            let adjacent = engine.get_adjacent(&preds, pivot)?;
            let show = |id: Option<u64>| id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
            println!("prev: {}", show(adjacent.prev));
            println!("next: {}", show(adjacent.next));
        }
        Command::Random => {
            let preds = engine.query_with_user_filter(&query, user_id, EntityKind::Image)?;
            let image = engine.random_image(&preds)?;
            println!("{}\t{}\t{}", image.id, image.name, image.location);
        }
        Command::Export(path) => {
            let Some(format) = ExportFormat::from_path(&path) else {
                bail!("cannot tell export format from '{}', use .csv or .json", path.display());
            };
            let preds = engine.query_with_user_filter(&query, user_id, kind)?;
            let count = export::export_results(&engine, &preds, kind, &path, format)?;
            println!("Exported {} rows as {} to {}", count, format.name(), path.display());
        }
        Command::Hash => {
            let report = hashing::hash_missing(db, &config.image_dir, config.hashing.threads)?;
            println!("Hashed {} images ({} failed)", report.hashed, report.failed);
        }
        Command::Stats => {
            let mut cache = ImageCountCache::new(Duration::from_secs(config.search.count_cache_secs));
            println!("Images: {}", cache.get(db)?);
            println!("Unhashed: {}", db.images_without_hashes()?.len());
        }
    }

    Ok(())
}

fn print_footer<T>(result: &SearchResult<T>, start: u64) {
    println!("{} of {} results", result.items.len(), result.total);
    if result.page_stride > 0 {
        match PageMenu::build(start, result.page_stride, result.total) {
            Ok(menu) => println!("{}", menu),
            Err(e) => tracing::debug!(error = %e, "no page menu"),
        }
    }
}

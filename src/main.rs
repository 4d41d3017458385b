use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notegraph::utils::{ensure_database_directory, get_database_path, get_tag_names};
use notegraph::{
    Database, EdgeCandidate, HierarchyKind, NoteId, NoteService, RetrievalConfig, RetrievalError,
    SearchResult, TagSource,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// notegraph - graph-based retrieval over a personal note archive
#[derive(Parser)]
#[command(name = "notegraph")]
#[command(about = "Search notes through keywords and the tag graph")]
#[command(version)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Add a new note with optional tags
    Add(AddCommand),
    /// Search notes by keywords and tag graph
    Search(SearchCommand),
    /// List notes related to a note through the tag graph
    Related(RelatedCommand),
    /// Create or update an edge between two tags
    Link(LinkCommand),
    /// Delete the edge between two tags
    Unlink(UnlinkCommand),
    /// Manage tag aliases
    Alias {
        #[command(subcommand)]
        command: AliasCommands,
    },
    /// Recompute degree centrality for every tag
    BackfillCentrality,
}

#[derive(Parser)]
struct AddCommand {
    /// The content of the note
    #[arg(value_name = "CONTENT")]
    content: String,

    /// Comma-separated tags to apply to the note
    #[arg(short, long, value_name = "TAGS")]
    tags: Option<String>,
}

#[derive(Parser)]
struct SearchCommand {
    /// Free-text query
    #[arg(value_name = "QUERY")]
    query: String,

    /// Maximum number of results
    #[arg(short, long, default_value_t = 10)]
    limit: usize,

    /// Skip the keyword channel
    #[arg(long)]
    graph_only: bool,
}

#[derive(Parser)]
struct RelatedCommand {
    /// ID of the note to start from
    #[arg(value_name = "NOTE_ID")]
    note_id: i64,

    /// Maximum number of results
    #[arg(short, long, default_value_t = 10)]
    limit: usize,
}

#[derive(Parser)]
struct LinkCommand {
    /// Narrower tag (the edge source)
    #[arg(value_name = "NARROWER")]
    narrower: String,

    /// Broader tag (the edge target)
    #[arg(value_name = "BROADER")]
    broader: String,

    /// Edge confidence in [0.0, 1.0]
    #[arg(short, long, default_value_t = 1.0)]
    confidence: f64,

    /// Hierarchy kind: generic (is-a) or partitive (part-of)
    #[arg(short, long)]
    kind: Option<HierarchyKind>,
}

#[derive(Parser)]
struct UnlinkCommand {
    #[arg(value_name = "NARROWER")]
    narrower: String,

    #[arg(value_name = "BROADER")]
    broader: String,
}

#[derive(Subcommand)]
enum AliasCommands {
    /// Map an alternate name to a canonical tag
    Add {
        alias: String,
        canonical: String,
    },
    /// Remove an alias
    Remove { alias: String },
    /// List all aliases
    List,
}

fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_env("NOTEGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    if let Commands::Add(cmd) = &cli.command
        && cmd.content.trim().is_empty()
    {
        anyhow::bail!("Note content cannot be empty");
    }

    let service = open_service()?;

    match &cli.command {
        Commands::Add(cmd) => execute_add(&service, &cmd.content, cmd.tags.as_deref()),
        Commands::Search(cmd) => execute_search(&service, cmd, cli.json),
        Commands::Related(cmd) => {
            let results = service.related_to_note(NoteId::new(cmd.note_id), cmd.limit)?;
            print_results(&service, &results, cli.json)
        }
        Commands::Link(cmd) => execute_link(&service, cmd, cli.json),
        Commands::Unlink(cmd) => execute_unlink(&service, cmd),
        Commands::Alias { command } => execute_alias(&service, command, cli.json),
        Commands::BackfillCentrality => {
            let changed = service.backfill_centrality()?;
            println!("Centrality recomputed ({changed} tags changed)");
            Ok(())
        }
    }
}

fn open_service() -> Result<NoteService> {
    let db_path = get_database_path()?;
    ensure_database_directory(&db_path)?;

    let db = Database::open(&db_path).context("Failed to open database")?;
    let config = RetrievalConfig::from_env()?;
    Ok(NoteService::with_config(db, config)?)
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors include validation failures and references to missing notes
/// or tags. Internal errors include database failures and timeouts.
fn is_user_error(error: &anyhow::Error) -> bool {
    if let Some(retrieval) = error.downcast_ref::<RetrievalError>() {
        return matches!(
            retrieval,
            RetrievalError::Configuration(_) | RetrievalError::NoteNotFound(_)
        );
    }
    let error_msg = error.to_string();
    ["cannot be empty", "does not exist", "is empty after normalization", "Unknown tag"]
        .iter()
        .any(|marker| error_msg.contains(marker))
}

fn execute_add(service: &NoteService, content: &str, tags: Option<&str>) -> Result<()> {
    let parsed_tags = tags.map(parse_tags).unwrap_or_default();
    let tag_refs: Vec<&str> = parsed_tags.iter().map(String::as_str).collect();

    let note = service
        .create_note(content, (!tag_refs.is_empty()).then_some(tag_refs.as_slice()))
        .context("Failed to create note")?;

    print!("Note created (id: {})", note.id());
    if !parsed_tags.is_empty() {
        print!(" with tags: {}", parsed_tags.join(", "));
    }
    println!();

    Ok(())
}

fn execute_search(service: &NoteService, cmd: &SearchCommand, json: bool) -> Result<()> {
    if cmd.graph_only {
        let results = service.graph_search(&cmd.query, cmd.limit)?;
        return print_results(service, &results, json);
    }

    let response = service.search(&cmd.query, cmd.limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if let Some(reason) = response.metadata.graph_skipped {
        eprintln!("(graph channel skipped: {reason})");
    }
    print_results(service, &response.results, false)
}

fn execute_link(service: &NoteService, cmd: &LinkCommand, json: bool) -> Result<()> {
    let source = require_tag(service, &cmd.narrower)?;
    let target = require_tag(service, &cmd.broader)?;

    let mut candidate = EdgeCandidate::new(source, target, cmd.confidence);
    if let Some(kind) = cmd.kind {
        candidate = candidate.hierarchy_kind(kind);
    }
    let edge = service.create_edge(&candidate)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&edge)?);
    } else {
        println!(
            "Linked {} -> {} (confidence {:.2})",
            cmd.narrower, cmd.broader, edge.confidence()
        );
    }
    Ok(())
}

fn execute_unlink(service: &NoteService, cmd: &UnlinkCommand) -> Result<()> {
    let source = require_tag(service, &cmd.narrower)?;
    let target = require_tag(service, &cmd.broader)?;

    if service.delete_edge(source, target)? {
        println!("Unlinked {} -> {}", cmd.narrower, cmd.broader);
    } else {
        println!("No edge {} -> {}", cmd.narrower, cmd.broader);
    }
    Ok(())
}

fn execute_alias(service: &NoteService, command: &AliasCommands, json: bool) -> Result<()> {
    match command {
        AliasCommands::Add { alias, canonical } => {
            let tag_id = require_tag(service, canonical)?;
            service.create_alias(alias, tag_id, TagSource::User, 1.0, None)?;
            println!("Alias created: {alias} -> {canonical}");
        }
        AliasCommands::Remove { alias } => {
            service.remove_alias(alias)?;
            println!("Alias removed: {alias}");
        }
        AliasCommands::List => {
            let aliases = service.list_aliases()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&aliases)?);
            } else if aliases.is_empty() {
                println!("No aliases");
            } else {
                for alias in aliases {
                    println!("{} -> tag {} ({})", alias.alias(), alias.canonical_tag_id(), alias.source());
                }
            }
        }
    }
    Ok(())
}

fn require_tag(service: &NoteService, name: &str) -> Result<notegraph::TagId> {
    service
        .find_tag(name)?
        .map(|tag| tag.id())
        .ok_or_else(|| anyhow::anyhow!("Unknown tag '{name}'"))
}

fn print_results(service: &NoteService, results: &[SearchResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No matching notes");
        return Ok(());
    }

    for result in results {
        let tags = get_tag_names(service.database(), result.note.tags())?;
        let marker = if result.found_by_both { "*" } else { " " };
        println!(
            "{marker}[{:.3}] #{} {}",
            result.relevance_score,
            result.note.id(),
            first_line(result.note.content())
        );
        if !tags.is_empty() {
            println!("         tags: {}", tags.join(", "));
        }
    }
    Ok(())
}

fn first_line(content: &str) -> &str {
    content.lines().next().unwrap_or_default()
}

/// Parses comma-separated tags from a string.
///
/// Splits on commas, trims whitespace from each tag, and filters out empty strings.
fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

//! CLI entry point for `smak`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use smak::config::Config;
use smak::maildir::Archiver;
use smak::model::mail::{lossy, MsgId};
use smak::parser::eml::{parse_message, ParseOptions};

#[derive(Parser)]
#[command(
    name = "smak",
    version,
    about = "Archive a maildir of mailing list messages as static HTML pages"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive every message in new/ (the default)
    Archive {
        /// Maildir to archive
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Regenerate all month pages and the index page
    Pages {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Show one record from the central log
    Show {
        dir: PathBuf,
        /// Record identifier (byte offset in the log)
        id: u64,
        #[arg(long)]
        json: bool,
    },
    /// Decode a single message file without archiving it
    Parse {
        file: PathBuf,
        #[arg(long)]
        json: bool,
        /// Treat an unparsable Date: header as unknown instead of failing
        #[arg(long)]
        lenient_dates: bool,
    },
    /// Print the effective configuration
    Config {
        /// Write it to the config file as well
        #[arg(long)]
        write: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = smak::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        None => cmd_archive(Path::new("."), &config),
        Some(Commands::Archive { dir }) => cmd_archive(&dir, &config),
        Some(Commands::Pages { dir }) => cmd_pages(&dir, &config),
        Some(Commands::Show { dir, id, json }) => cmd_show(&dir, MsgId(id), json, &config),
        Some(Commands::Parse {
            file,
            json,
            lenient_dates,
        }) => cmd_parse(&file, json, !lenient_dates && config.archive.strict_dates),
        Some(Commands::Config { write }) => cmd_config(&config, write),
        Some(Commands::Completions { shell }) => cmd_completions(shell),
        Some(Commands::Manpage) => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = smak::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "smak.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Print the configuration as TOML, optionally saving it.
fn cmd_config(config: &Config, write: bool) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    println!();
    println!("# log file: {}", smak::config::log_file_path(config).display());
    if write {
        smak::config::save_config(config)?;
        if let Some(path) = smak::config::config_file_path() {
            println!("# written to {}", path.display());
        }
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "smak", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Archive new mail and print a summary.
fn cmd_archive(dir: &Path, config: &Config) -> anyhow::Result<()> {
    let mut archiver = Archiver::open(dir, config)
        .with_context(|| format!("Cannot open maildir {}", dir.display()))?;

    let pending = archiver.pending()?.len();
    if pending == 0 {
        println!("  No new messages in {}", dir.join("new").display());
        return Ok(());
    }

    let pb = ProgressBar::new(pending as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Archiving [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let stats = archiver.process_new_dir_with(|done, _total| pb.set_position(done as u64))?;
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    use humansize::{format_size, BINARY};
    println!();
    println!("  {:<20} {}", "Maildir", dir.display());
    println!("  {:<20} {}", "Archived", stats.archived);
    println!("  {:<20} {}", "Rejected", stats.rejected);
    if stats.skipped > 0 {
        println!("  {:<20} {} (left in new/)", "Skipped", stats.skipped);
    }
    println!("  {:<20} {}", "Mail read", format_size(stats.bytes, BINARY));
    if !stats.months.is_empty() {
        let months: Vec<String> = stats.months.iter().map(ToString::to_string).collect();
        println!("  {:<20} {}", "Months updated", months.join(", "));
    }
    println!("  {:<20} {:.2?}", "Time", elapsed);
    println!();

    Ok(())
}

/// Rebuild the month and index pages from the reports.
fn cmd_pages(dir: &Path, config: &Config) -> anyhow::Result<()> {
    let mut archiver = Archiver::open(dir, config)
        .with_context(|| format!("Cannot open maildir {}", dir.display()))?;
    let months = archiver.regenerate_pages()?;
    println!(
        "  Regenerated {months} month page(s) in {}",
        archiver.site().dir().display()
    );
    Ok(())
}

/// Print one log record.
fn cmd_show(dir: &Path, id: MsgId, json: bool, config: &Config) -> anyhow::Result<()> {
    let store = smak::store::log::LogStore::init(dir.join(&config.archive.store_dir))?;
    let snapshot = store.snapshot()?;
    let record = snapshot.get(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record.to_json(id))?);
        return Ok(());
    }

    let date_format = config.general.checked_date_format();
    let date = record
        .date()
        .map(|d| d.format(&date_format).to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!();
    println!("  {:<14} {}", "Id", id);
    println!("  {:<14} {}", "Name", lossy(record.uniq));
    println!("  {:<14} {}", "Message-ID", lossy(record.message_id));
    println!("  {:<14} {}", "Date", date);
    println!("  {:<14} {}", "From", lossy(record.from));
    println!("  {:<14} {}", "To", lossy(record.to));
    println!("  {:<14} {}", "In-Reply-To", lossy(record.in_reply_to));
    println!("  {:<14} {}", "Subject", lossy(record.subject));
    println!();
    Ok(())
}

/// Decode one message file and print its fields.
fn cmd_parse(file: &Path, json: bool, strict_dates: bool) -> anyhow::Result<()> {
    let mut buf = std::fs::read(file).with_context(|| format!("Cannot read {}", file.display()))?;
    let size = buf.len() as u64;
    let msg = parse_message(&mut buf, ParseOptions { strict_dates })
        .with_context(|| format!("Cannot parse {}", file.display()))?;

    if json {
        let output = serde_json::json!({
            "file": file.to_string_lossy(),
            "size": size,
            "subject": lossy(msg.subject),
            "from": lossy(msg.from),
            "to": lossy(msg.to),
            "message_id": lossy(msg.message_id),
            "in_reply_to": lossy(msg.in_reply_to),
            "date": msg.date.map(|d| d.to_rfc3339()),
            "transfer_encoding": msg.transfer_encoding,
            "body_start": msg.body_span.start,
            "body_length": msg.body.len(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    use humansize::{format_size, BINARY};
    let date = msg
        .date
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());
    println!();
    println!("  {:<20} {}", "File", file.display());
    println!("  {:<20} {}", "Size", format_size(size, BINARY));
    println!("  {:<20} {}", "Subject", lossy(msg.subject));
    println!("  {:<20} {}", "From", lossy(msg.from));
    println!("  {:<20} {}", "To", lossy(msg.to));
    println!("  {:<20} {}", "Message-ID", lossy(msg.message_id));
    println!("  {:<20} {}", "In-Reply-To", lossy(msg.in_reply_to));
    println!("  {:<20} {}", "Date", date);
    println!(
        "  {:<20} {}",
        "Transfer encoding",
        msg.transfer_encoding.as_str()
    );
    println!(
        "  {:<20} {}",
        "Body",
        format_size(msg.body.len() as u64, BINARY)
    );
    println!();
    Ok(())
}

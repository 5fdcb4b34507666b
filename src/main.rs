//! CLI entry point for `mboxindex`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mboxindex::config::Config;
use mboxindex::model::contact::Contact;
use mboxindex::model::mailbox::{MailBox, MailBoxType};
use mboxindex::store::{MailBoxSpec, MailboxStore};

#[derive(Parser)]
#[command(
    name = "mboxindex",
    version,
    about = "Index mbox files and read message bodies on demand"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Index an mbox file and list its messages
    Index {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the body of one message (0-based)
    Body { path: PathBuf, index: usize },
    /// Index several mbox files in parallel and list their contacts
    Contacts {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
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

    let config = mboxindex::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Index { path, json } => cmd_index(config, &path, json),
        Commands::Body { path, index } => cmd_body(config, &path, index),
        Commands::Contacts { paths, json } => cmd_contacts(config, &paths, json),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mboxindex::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mboxindex.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxindex", &mut std::io::stdout());
    Ok(())
}

fn cmd_manpage() -> anyhow::Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Index one file behind a progress bar.
fn load_one(store: &mut MailboxStore, path: &Path) -> anyhow::Result<Arc<MailBox>> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let spec = MailBoxSpec::from_path(path);

    let file_size = std::fs::metadata(path)?.len();
    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Indexing [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mailbox = store.load_with_progress(
        spec.kind,
        spec.name,
        path,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();

    for warning in mailbox.warnings() {
        eprintln!("warning: {warning}");
    }
    Ok(mailbox)
}

/// Index a file and print its message list.
fn cmd_index(config: Config, path: &Path, json: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut store = MailboxStore::new(config);
    let mailbox = load_one(&mut store, path)?;
    let elapsed = start.elapsed();

    if json {
        print_messages_json(&mailbox)?;
    } else {
        print_messages_table(path, &mailbox, store.registry().len(), elapsed)?;
    }
    Ok(())
}

/// Print the body of one message.
fn cmd_body(config: Config, path: &Path, index: usize) -> anyhow::Result<()> {
    let mut store = MailboxStore::new(config);
    let mailbox = load_one(&mut store, path)?;
    let Some(message) = mailbox.messages().get(index) else {
        anyhow::bail!(
            "Message {index} out of range: {} has {} message(s)",
            path.display(),
            mailbox.messages().len()
        );
    };
    print!("{}", message.body()?);
    Ok(())
}

/// Index files in parallel and print every interned contact.
fn cmd_contacts(config: Config, paths: &[PathBuf], json: bool) -> anyhow::Result<()> {
    for path in paths {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
    }

    let specs: Vec<MailBoxSpec> = paths.iter().cloned().map(MailBoxSpec::from_path).collect();
    let mut store = MailboxStore::new(config);

    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Indexing {} file(s)", specs.len()));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    let loaded = store.load_all(&specs);
    pb.finish_and_clear();
    loaded?;

    let book = store.address_book();
    if json {
        let items: Vec<serde_json::Value> = book.find_all().iter().map(|c| contact_json(c)).collect();
        let output = serde_json::json!({
            "contact_count": items.len(),
            "contacts": items,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {book}");
    println!();
    println!("  {:<30} {:<40}", "Name", "Address");
    println!("  {}", "-".repeat(71));
    for contact in book.find_all() {
        let name: String = contact.display_name().chars().take(29).collect();
        println!("  {:<30} {:<40}", name, contact.address());
    }
    println!();
    Ok(())
}

fn contact_json(contact: &Contact) -> serde_json::Value {
    serde_json::json!({
        "address": contact.address(),
        "display_name": contact.display_name(),
        "first_name": contact.first_name(),
        "last_name": contact.last_name(),
    })
}

/// Print the message list as a human-readable table.
fn print_messages_table(
    path: &Path,
    mailbox: &MailBox,
    contacts: usize,
    elapsed: std::time::Duration,
) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let file_size = std::fs::metadata(path)?.len();
    let kind = match mailbox.kind() {
        MailBoxType::Folder => "folder",
        MailBoxType::Inbox => "inbox",
        MailBoxType::Trash => "trash",
        MailBoxType::Sent => "sent",
        MailBoxType::Drafts => "drafts",
        MailBoxType::Other => "other",
    };

    println!();
    println!("  {:<20} {}", "File:", path.display());
    println!("  {:<20} {} ({kind})", "Mailbox:", mailbox.name());
    println!("  {:<20} {}", "File size:", format_size(file_size, BINARY));
    println!("  {:<20} {}", "Messages:", mailbox.messages().len());
    println!("  {:<20} {}", "Contacts:", contacts);
    println!("  {:<20} {}", "Warnings:", mailbox.warnings().len());
    println!("  {:<20} {:.2?}", "Indexing time:", elapsed);
    println!();

    if mailbox.messages().is_empty() {
        return Ok(());
    }

    println!("  {:<5} {:<17} {:<25} {:<40}", "#", "Date", "From", "Subject");
    println!("  {}", "-".repeat(89));
    for (i, message) in mailbox.messages().iter().enumerate() {
        let date = message.date().format("%Y-%m-%d %H:%M").to_string();
        let from = message
            .from()
            .map(|c| c.display_name())
            .unwrap_or_default();
        let from_trunc: String = from.chars().take(24).collect();
        let subj_trunc: String = message.subject().chars().take(39).collect();
        println!("  {:<5} {:<17} {:<25} {:<40}", i, date, from_trunc, subj_trunc);
    }
    println!();
    Ok(())
}

/// Print the message list as JSON.
fn print_messages_json(mailbox: &MailBox) -> anyhow::Result<()> {
    let items: Vec<serde_json::Value> = mailbox
        .messages()
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let list = |contacts: Option<&[Arc<Contact>]>| {
                contacts
                    .unwrap_or_default()
                    .iter()
                    .map(|c| contact_json(c))
                    .collect::<Vec<_>>()
            };
            serde_json::json!({
                "index": i,
                "date": m.date().to_rfc3339(),
                "from": m.from().map(|c| contact_json(c)),
                "to": list(m.to()),
                "cc": list(m.cc()),
                "subject": m.subject(),
                "message_id": m.id(),
                "references": m.references(),
            })
        })
        .collect();

    let warnings: Vec<String> = mailbox.warnings().iter().map(|w| w.to_string()).collect();
    let output = serde_json::json!({
        "mailbox": mailbox.name(),
        "kind": mailbox.kind(),
        "message_count": items.len(),
        "messages": items,
        "warnings": warnings,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

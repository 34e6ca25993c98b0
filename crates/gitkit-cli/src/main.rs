//! Gitkit CLI - Command line interface for virtual git repositories
//!
//! Usage:
//!   gitkit --db app.db write index.html < index.html   # Write a working-tree file
//!   gitkit --db app.db commit -m "Add index"             # Commit all changes
//!   gitkit --db app.db log                               # Show history
//!   gitkit --db app.db info-refs                         # GET info/refs body
//!   gitkit --db app.db upload-pack                       # POST git-upload-pack body
//!   gitkit inspect < body                                # Decode a pkt-line stream

mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gitkit::protocol::pktline::{PktLine, PktLineReader};
use gitkit::{
    EphemeralRepository, EphemeralRepositoryBuilder, FileChange, GitConfig, GitPlumbing,
    LoosePlumbing, PersistentStore, RepositorySession, SmartProtocolServer, TemplateSnapshot,
};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Gitkit - Virtual git repositories served over smart-HTTP
#[derive(Parser, Debug)]
#[command(name = "gitkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database holding the session repository
    #[arg(long, global = true, default_value = "gitkit.db")]
    db: PathBuf,

    /// Commit author name
    #[arg(long, global = true)]
    author_name: Option<String>,

    /// Commit author email
    #[arg(long, global = true)]
    author_email: Option<String>,

    /// Branch for new repositories
    #[arg(long, global = true)]
    branch: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a working-tree file from stdin or --from
    Write {
        path: String,
        /// Read content from this host file instead of stdin
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Print a working-tree file
    Read { path: String },
    /// Delete a working-tree file
    Rm { path: String },
    /// Show changes against HEAD
    Status,
    /// Commit all working-tree changes
    Commit {
        #[arg(short, long)]
        message: String,
    },
    /// Show first-parent history
    Log {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Emit the info/refs advertisement
    InfoRefs {
        /// JSON object of path to text used as the base commit
        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// Emit the upload-pack response
    UploadPack {
        /// JSON object of path to text used as the base commit
        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// Decode a pkt-line stream from stdin
    Inspect,
}

impl Args {
    fn git_config(&self) -> GitConfig {
        let mut config = GitConfig::new();
        if self.author_name.is_some() || self.author_email.is_some() {
            let name = self.author_name.as_deref().unwrap_or(config.author_name()).to_string();
            let email = self.author_email.as_deref().unwrap_or(config.author_email()).to_string();
            config = config.author(name, email);
        }
        if let Some(branch) = &self.branch {
            config = config.default_branch(branch.as_str());
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(args, &mut std::io::stdin(), &mut out).await?;
    out.flush()?;
    Ok(())
}

async fn run(args: Args, input: &mut dyn Read, out: &mut dyn Write) -> Result<()> {
    let config = args.git_config();
    let plumbing: Arc<dyn GitPlumbing> = Arc::new(LoosePlumbing::new());
    let open = || open_session(&args.db, Arc::clone(&plumbing), config.clone());

    match &args.command {
        Command::Write { path, from } => {
            let content = match from {
                Some(file) => std::fs::read(file)
                    .with_context(|| format!("Failed to read {}", file.display()))?,
                None => read_all(input)?,
            };
            open()
                .await?
                .write_file(path, &content)
                .await
                .with_context(|| format!("Failed to write {path}"))?;
        }
        Command::Read { path } => {
            let content = open()
                .await?
                .read_file(path)
                .await
                .with_context(|| format!("Failed to read {path}"))?;
            out.write_all(&content)?;
        }
        Command::Rm { path } => {
            open()
                .await?
                .delete_file(path)
                .await
                .with_context(|| format!("Failed to delete {path}"))?;
        }
        Command::Status => {
            let status = open().await?.status().await.context("Failed to compute status")?;
            for entry in status {
                let marker = match entry.change {
                    FileChange::Added => 'A',
                    FileChange::Modified => 'M',
                    FileChange::Deleted => 'D',
                };
                writeln!(out, "{marker} {}", entry.path)?;
            }
        }
        Command::Commit { message } => match open().await?.commit(message).await? {
            Some(oid) => writeln!(out, "{oid}")?,
            None => writeln!(out, "nothing to commit")?,
        },
        Command::Log { limit } => {
            let log = open()
                .await?
                .format_log(*limit)
                .await
                .context("Failed to read log")?;
            out.write_all(log.as_bytes())?;
        }
        Command::InfoRefs { template } => {
            let session = open().await?;
            let repo = build(&plumbing, config.clone(), template.as_deref(), &session).await?;
            let body = SmartProtocolServer::new()
                .advertise_refs(&repo)
                .await
                .context("Failed to advertise refs")?;
            out.write_all(&body)?;
        }
        Command::UploadPack { template } => {
            let session = open().await?;
            let repo = build(&plumbing, config.clone(), template.as_deref(), &session).await?;
            let body = SmartProtocolServer::new()
                .generate_pack(&repo)
                .await
                .context("Failed to generate pack")?;
            out.write_all(&body)?;
        }
        Command::Inspect => inspect(&read_all(input)?, out)?,
    }
    Ok(())
}

fn read_all(input: &mut dyn Read) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    input.read_to_end(&mut buf).context("Failed to read stdin")?;
    Ok(buf)
}

async fn open_session(
    db: &Path,
    plumbing: Arc<dyn GitPlumbing>,
    config: GitConfig,
) -> Result<RepositorySession> {
    let store = PersistentStore::open(db)
        .with_context(|| format!("Failed to open store: {}", db.display()))?;
    RepositorySession::open(store, plumbing, config)
        .await
        .context("Failed to open session")
}

async fn build(
    plumbing: &Arc<dyn GitPlumbing>,
    config: GitConfig,
    template: Option<&Path>,
    session: &RepositorySession,
) -> Result<EphemeralRepository> {
    let template = match template {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read template: {}", path.display()))?;
            let snapshot: TemplateSnapshot = serde_json::from_str(&text)
                .with_context(|| format!("Invalid template JSON: {}", path.display()))?;
            Some(snapshot)
        }
        None => None,
    };

    let repo = EphemeralRepositoryBuilder::new(Arc::clone(plumbing))
        .config(config)
        .build(template.as_ref(), Some(session))
        .await
        .context("Failed to build repository")?;
    tracing::info!(outcome = ?repo.outcome(), "repository built");
    Ok(repo)
}

fn inspect(body: &[u8], out: &mut dyn Write) -> Result<()> {
    for frame in PktLineReader::new(body) {
        match frame.context("Malformed pkt-line stream")? {
            PktLine::Flush => writeln!(out, "0000")?,
            PktLine::Data(data) if data.first().is_some_and(|b| (1..=3).contains(b)) => {
                writeln!(out, "band {} {} bytes", data[0], data.len() - 1)?;
            }
            PktLine::Data(data) => {
                let text = String::from_utf8_lossy(data).replace('\0', "\\0");
                writeln!(out, "{}", text.trim_end_matches('\n'))?;
            }
        }
    }
    Ok(())
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand_core::{OsRng, RngCore};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use vaultfs::cipher::{CipherContext, IV_LEN, KEY_LEN};
use vaultfs::config::{self, Config};
use vaultfs::file_ops::VaultFileOps;

/// VaultFS - Encrypted file vault with streaming AES-256-CBC storage
#[derive(Parser)]
#[command(name = "vaultfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize VaultFS (generate config with fresh key and IV)
    Init {
        /// Upload directory path
        #[arg(short, long, default_value = "./uploads")]
        upload_dir: String,
    },

    /// Encrypt a file into the vault
    Store {
        /// Input file to store
        input: PathBuf,

        /// Owner id recorded in the file metadata
        #[arg(short, long, default_value_t = 0)]
        owner: i64,
    },

    /// Decrypt a stored file
    Fetch {
        /// Storage name of the file (see `list`)
        name: String,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List all stored files
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Remove a stored file
    Remove {
        /// Storage name of the file to remove
        name: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show vault status and statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging
    // Use RUST_LOG environment variable to control log level (e.g., RUST_LOG=info,vaultfs=debug)
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "VaultFS starting");

    match cli.command {
        Commands::Init { upload_dir } => cmd_init(&cli.config, &upload_dir).await,

        Commands::Store { input, owner } => cmd_store(&cli.config, &input, owner).await,

        Commands::Fetch { name, output } => cmd_fetch(&cli.config, &name, output.as_ref()).await,

        Commands::List { verbose } => cmd_list(&cli.config, verbose).await,

        Commands::Remove { name, yes } => cmd_remove(&cli.config, &name, yes).await,

        Commands::Status => cmd_status(&cli.config).await,
    }
}

/// Load config and build the vault operations handle
fn open_vault(config_path: &str) -> Result<(Config, VaultFileOps)> {
    let cfg = Config::load_with_env(Some(config_path))?;
    let ctx = Arc::new(cfg.cipher_context()?);
    let ops = VaultFileOps::new(ctx, &cfg.upload_dir).with_limits(cfg.retrieve_limits());
    Ok((cfg, ops))
}

/// Create a styled progress bar for file operations
fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Initialize VaultFS configuration with freshly generated key material
async fn cmd_init(config_path: &str, upload_dir: &str) -> Result<()> {
    println!("Initializing VaultFS...");

    if fs::try_exists(config_path).await.unwrap_or(false) {
        anyhow::bail!(
            "Configuration file '{}' already exists. Remove it first or use a different path.",
            config_path
        );
    }

    // Generate key and IV
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let cfg = Config::new(upload_dir, hex::encode(key), hex::encode(iv));

    // Validate the generated material the same way startup will
    let _ctx = CipherContext::from_hex(&cfg.key_hex, &cfg.iv_hex)?;

    fs::create_dir_all(upload_dir)
        .await
        .with_context(|| format!("creating upload directory '{}'", upload_dir))?;

    let config_json = serde_json::to_string_pretty(&cfg)?;
    fs::write(config_path, config_json)
        .await
        .with_context(|| format!("writing config to '{}'", config_path))?;

    println!("Initialization complete!");
    println!("Config:   {}", config_path);
    println!("Uploads:  {}", upload_dir);
    println!();
    println!("IMPORTANT: The config file contains your encryption key and IV.");
    println!("Keep it secure and backed up - without it, stored files cannot be recovered.");
    println!(
        "For production, move the key material into the {} and {} environment variables.",
        config::ENV_KEY,
        config::ENV_IV
    );

    Ok(())
}

/// Encrypt a file into the vault
async fn cmd_store(config_path: &str, input: &PathBuf, owner: i64) -> Result<()> {
    let (_cfg, ops) = open_vault(config_path)?;

    let original_name = input
        .file_name()
        .context("input file has no filename")?
        .to_string_lossy()
        .to_string();

    let input_size = fs::metadata(input)
        .await
        .with_context(|| format!("reading metadata for {:?}", input))?
        .len();

    let pb = create_progress_bar(input_size, "Encrypting");

    let mut file = fs::File::open(input)
        .await
        .with_context(|| format!("opening {:?}", input))?;

    let record = ops.ingest_file(&original_name, owner, &mut file).await?;

    pb.set_position(record.size);
    pb.finish_with_message(format!("Stored {} bytes", record.size));

    println!("  {} -> {}", input.display(), record.storage_name);
    println!("  id:           {}", record.id);
    println!("  content-type: {}", record.mime_type);
    Ok(())
}

/// Decrypt a stored file
async fn cmd_fetch(config_path: &str, name: &str, output: Option<&PathBuf>) -> Result<()> {
    let (_cfg, ops) = open_vault(config_path)?;

    // The sidecar is optional for fetch; use it for the content type when present
    if let Ok(meta) = ops.get_metadata(name).await {
        info!(file = name, content_type = %meta.mime_type, original = %meta.original_name, "fetching");
    }

    let spinner = create_spinner(&format!("Decrypting {}...", name));

    match output {
        Some(output_path) => {
            let mut file = fs::File::create(output_path)
                .await
                .with_context(|| format!("creating {:?}", output_path))?;

            let bytes = ops.retrieve(name, &mut file).await?;

            spinner.finish_with_message(format!("Decrypted {} bytes -> {:?}", bytes, output_path));
        }
        None => {
            spinner.finish_and_clear();
            let mut stdout = tokio::io::stdout();
            let bytes = ops.retrieve(name, &mut stdout).await?;
            eprintln!("Decrypted {} bytes to stdout", bytes);
        }
    }

    Ok(())
}

/// List all stored files
async fn cmd_list(config_path: &str, verbose: bool) -> Result<()> {
    let (_cfg, ops) = open_vault(config_path)?;

    let files = ops.list_files().await?;

    if files.is_empty() {
        println!("No stored files found");
        return Ok(());
    }

    println!("Stored files ({} total):", files.len());
    println!();

    if verbose {
        println!("{:<36} {:>14} {:>10}", "STORAGE NAME", "SIZE (bytes)", "METADATA");
        println!("{}", "-".repeat(64));

        for (name, size, has_meta) in files {
            let meta_status = if has_meta { "yes" } else { "no" };
            println!("{:<36} {:>14} {:>10}", name, size, meta_status);
        }
    } else {
        for (name, size, _) in files {
            println!("  {} ({} bytes)", name, size);
        }
    }

    Ok(())
}

/// Remove a stored file
async fn cmd_remove(config_path: &str, name: &str, yes: bool) -> Result<()> {
    let (_cfg, ops) = open_vault(config_path)?;

    if !ops.exists(name).await {
        anyhow::bail!("File '{}' not found in the vault", name);
    }

    if !yes {
        print!("Delete '{}'? This cannot be undone. [y/N]: ", name);
        io::stdout().flush()?;

        let mut response = String::new();
        io::stdin().read_line(&mut response)?;

        if !response.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    ops.delete_file(name).await?;

    println!("Deleted '{}'", name);

    Ok(())
}

/// Show vault status and statistics
async fn cmd_status(config_path: &str) -> Result<()> {
    let (cfg, ops) = open_vault(config_path)?;

    println!("VaultFS Status");
    println!();

    println!("Configuration:");
    println!("  Config file:      {}", config_path);
    println!("  Upload dir:       {}", cfg.upload_dir);
    println!("  Retrieve limit:   {} bytes", cfg.max_retrieve_bytes);
    println!("  Retrieve timeout: {}s", cfg.retrieve_timeout_secs);
    println!();

    let files = ops.list_files().await?;

    let total_files = files.len();
    let total_size: u64 = files.iter().map(|(_, size, _)| size).sum();
    let files_with_meta = files.iter().filter(|(_, _, has_meta)| *has_meta).count();

    println!("Vault Statistics:");
    println!("  Total files:       {}", total_files);
    println!(
        "  Total size:        {} bytes ({:.2} MB)",
        total_size,
        total_size as f64 / 1_048_576.0
    );
    println!("  With metadata:     {}/{}", files_with_meta, total_files);

    let orphaned = files.iter().filter(|(_, _, has_meta)| !*has_meta).count();
    if orphaned > 0 {
        println!();
        println!("WARNING: {} file(s) missing metadata", orphaned);
    }

    Ok(())
}

//! ossvault: client-side encrypted object storage CLI
//!
//! Local commands:
//!   encrypt <in> <out>         - seal a local file with the configured key
//!   decrypt <in> <out>         - open a sealed local file
//!   size <bytes>               - print the sealed size of a plaintext length
//!   keygen                     - print a fresh base64 key
//!   config show                - display current configuration
//!
//! Remote commands (S3 credentials from AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY):
//!   put <local> <remote>       - encrypt and upload
//!   get <remote> <local>       - download and decrypt
//!   ls [prefix] [--deep]       - list objects
//!   rm <remote>                - delete an object (or a tree with --recursive)
//!   url <remote> [--expires]   - public or pre-signed URL

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use ossvault_core::config::{LogConfig, OssVaultConfig};
use ossvault_core::{ByteSource, ChunkReader};
use ossvault_crypto::{build_codec, sealed_size, ChunkCodec, SealedCodec, SecretKey};
use ossvault_storage::{
    EncryptedAdapter, OperatorAdapter, StorageAdapter, StorageAttributes, WriteOptions,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "ossvault",
    version,
    about = "Client-side encrypted object storage",
    long_about = "ossvault: stream files to and from S3-compatible storage, sealed with XChaCha20-Poly1305"
)]
struct Cli {
    /// Path to ossvault.toml configuration file
    #[arg(long, short = 'c', env = "OSSVAULT_CONFIG", default_value = "ossvault.toml")]
    config: PathBuf,

    /// Base64 encryption key (overrides encryption.key in the config)
    #[arg(long, global = true, env = "OSSVAULT_KEY", hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a local file
    Encrypt {
        input: PathBuf,
        output: PathBuf,
    },

    /// Decrypt a local file produced by `encrypt` or `put`
    Decrypt {
        input: PathBuf,
        output: PathBuf,
    },

    /// Encrypt a local file and upload it
    ///
    /// Credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.
    Put {
        local: PathBuf,
        /// Object path, relative to storage.root
        remote: String,
    },

    /// Download an object and decrypt it
    Get {
        remote: String,
        local: PathBuf,
    },

    /// List objects under a prefix
    Ls {
        #[arg(default_value = "")]
        prefix: String,
        /// Recurse into sub-directories
        #[arg(long)]
        deep: bool,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete an object
    Rm {
        remote: String,
        /// Delete everything under `remote` as a directory
        #[arg(long, short = 'r')]
        recursive: bool,
    },

    /// Print the URL of an object
    Url {
        remote: String,
        /// Pre-sign a read URL valid for this many seconds
        #[arg(long)]
        expires: Option<u64>,
    },

    /// Print the sealed size of a plaintext of <bytes> length
    Size {
        bytes: u64,
    },

    /// Generate a new random encryption key
    Keygen,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = OssVaultConfig::load(&cli.config).context("loading config")?;
    if let Some(key) = cli.key {
        config.encryption.key = Some(key);
    }
    init_logging(&config.log);

    match cli.command {
        Commands::Encrypt { input, output } => cmd_encrypt(&config, &input, &output).await,
        Commands::Decrypt { input, output } => cmd_decrypt(&config, &input, &output).await,
        Commands::Put { local, remote } => cmd_put(&config, &local, &remote).await,
        Commands::Get { remote, local } => cmd_get(&config, &remote, &local).await,
        Commands::Ls { prefix, deep, json } => cmd_ls(&config, &prefix, deep, json).await,
        Commands::Rm { remote, recursive } => cmd_rm(&config, &remote, recursive).await,
        Commands::Url { remote, expires } => cmd_url(&config, &remote, expires).await,
        Commands::Size { bytes } => cmd_size(&config, bytes),
        Commands::Keygen => cmd_keygen(),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(log: &LogConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    if log.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

// ── Codec and storage from config ─────────────────────────────────────────────

/// The configured codec, refusing to run without a key.
fn sealing_codec(config: &OssVaultConfig) -> Result<std::sync::Arc<dyn ChunkCodec>> {
    if config.encryption.key.is_none() {
        anyhow::bail!(
            "no encryption key configured\n\
             Set encryption.key in the config, pass --key, or export OSSVAULT_KEY.\n\
             Generate one with: ossvault keygen"
        );
    }
    build_codec(&config.encryption).context("building codec")
}

/// Encrypting adapter over S3 using credentials from environment variables.
///
/// Reads AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY (standard S3 env vars).
fn build_adapter_from_env(config: &OssVaultConfig) -> Result<EncryptedAdapter<OperatorAdapter>> {
    let access_key = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("OSSVAULT_ACCESS_KEY_ID"))
        .context(
            "S3 credentials not set\n\
             Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
             Example:\n\
             \texport AWS_ACCESS_KEY_ID=your-key\n\
             \texport AWS_SECRET_ACCESS_KEY=your-secret",
        )?;
    let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("OSSVAULT_SECRET_ACCESS_KEY"))
        .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;

    let inner = OperatorAdapter::from_config(&config.storage, &access_key, &secret_key)
        .context("building storage adapter")?;
    if config.encryption.key.is_none() {
        tracing::warn!("no encryption key configured, objects are stored in plaintext");
    }
    EncryptedAdapter::from_config(inner, &config.encryption).context("building codec")
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_progress_bar(total: Option<u64>, prefix: &str) -> ProgressBar {
    let pb = match total {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template(
                    "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{prefix:.bold} {spinner} {bytes} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        }
    };
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Copy `reader` into a new file at `output`, removing the file on failure
/// so a half-written plaintext or ciphertext is never left behind.
async fn pump_to_file<R>(reader: &mut R, output: &Path, pb: &ProgressBar) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let result = async {
        let mut file = tokio::fs::File::create(output)
            .await
            .with_context(|| format!("creating {}", output.display()))?;
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            total += n as u64;
            pb.inc(n as u64);
        }
        file.flush().await?;
        Ok::<_, anyhow::Error>(total)
    }
    .await;

    if result.is_err() {
        pb.abandon_with_message("failed");
        if let Err(e) = tokio::fs::remove_file(output).await {
            tracing::debug!(path = %output.display(), error = %e, "removing partial output");
        }
    }
    result
}

// ── `ossvault encrypt` / `decrypt` ────────────────────────────────────────────

async fn cmd_encrypt(config: &OssVaultConfig, input: &Path, output: &Path) -> Result<()> {
    let codec = sealing_codec(config)?;
    let (reader, stat) = ByteSource::from_file(input)
        .await
        .with_context(|| format!("opening {}", input.display()))?
        .into_parts();

    let sealed_stat = codec.stat(&stat);
    let pb = make_progress_bar(sealed_stat.size, "encrypt");
    let mut sealed = ChunkReader::new(codec.encrypt(reader), sealed_stat);
    let written = pump_to_file(&mut sealed, output, &pb)
        .await
        .with_context(|| format!("encrypting {}", input.display()))?;

    pb.finish_with_message("done");
    println!(
        "{} -> {} ({} -> {})",
        input.display(),
        output.display(),
        fmt_bytes(stat.size.unwrap_or(0)),
        fmt_bytes(written)
    );
    Ok(())
}

async fn cmd_decrypt(config: &OssVaultConfig, input: &Path, output: &Path) -> Result<()> {
    let codec = sealing_codec(config)?;
    let (reader, stat) = ByteSource::from_file(input)
        .await
        .with_context(|| format!("opening {}", input.display()))?
        .into_parts();

    let plain_stat = codec.decrypted_stat(&stat);
    let pb = make_progress_bar(plain_stat.size, "decrypt");
    let mut plain = ChunkReader::new(codec.decrypt(reader), plain_stat);
    let written = pump_to_file(&mut plain, output, &pb)
        .await
        .with_context(|| format!("decrypting {}", input.display()))?;

    pb.finish_with_message("done");
    println!("{} -> {} ({})", input.display(), output.display(), fmt_bytes(written));
    Ok(())
}

// ── Remote commands ───────────────────────────────────────────────────────────

async fn cmd_put(config: &OssVaultConfig, local: &Path, remote: &str) -> Result<()> {
    let adapter = build_adapter_from_env(config)?;
    let source = ByteSource::from_file(local)
        .await
        .with_context(|| format!("opening {}", local.display()))?;
    let size = source.stat().size.unwrap_or(0);

    let pb = make_progress_bar(None, "put");
    pb.set_message(remote.to_string());
    let options = WriteOptions::default().visibility(config.storage.default_visibility);
    adapter
        .write_stream(remote, source, &options)
        .await
        .with_context(|| format!("uploading {}", local.display()))?;
    pb.finish_and_clear();

    println!("{} -> {} ({})", local.display(), remote, fmt_bytes(size));
    Ok(())
}

async fn cmd_get(config: &OssVaultConfig, remote: &str, local: &Path) -> Result<()> {
    let adapter = build_adapter_from_env(config)?;
    let mut source = adapter
        .read_stream(remote)
        .await
        .with_context(|| format!("downloading {remote}"))?;

    let pb = make_progress_bar(source.stat().size, "get");
    let written = pump_to_file(&mut source, local, &pb)
        .await
        .with_context(|| format!("downloading {remote}"))?;
    pb.finish_and_clear();

    println!("{} -> {} ({})", remote, local.display(), fmt_bytes(written));
    Ok(())
}

async fn cmd_ls(config: &OssVaultConfig, prefix: &str, deep: bool, json: bool) -> Result<()> {
    let adapter = build_adapter_from_env(config)?;
    let entries = adapter
        .list_contents(prefix, deep)
        .await
        .with_context(|| format!("listing {prefix:?}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

async fn cmd_rm(config: &OssVaultConfig, remote: &str, recursive: bool) -> Result<()> {
    let adapter = build_adapter_from_env(config)?;
    let deleted = if recursive {
        adapter.delete_directory(remote).await
    } else {
        adapter.delete(remote).await
    };
    deleted.with_context(|| format!("deleting {remote}"))?;
    println!("deleted {remote}");
    Ok(())
}

async fn cmd_url(config: &OssVaultConfig, remote: &str, expires: Option<u64>) -> Result<()> {
    let adapter = build_adapter_from_env(config)?;
    let url = match expires {
        Some(secs) => adapter
            .temporary_url(remote, Duration::from_secs(secs))
            .await
            .with_context(|| format!("pre-signing {remote}"))?,
        None => adapter.url(remote)?,
    };
    println!("{url}");
    Ok(())
}

// ── `ossvault size` / `keygen` / `config show` ────────────────────────────────

fn cmd_size(config: &OssVaultConfig, bytes: u64) -> Result<()> {
    let chunk_size = config.encryption.chunk_size;
    if !(SealedCodec::MIN_CHUNK_SIZE..=SealedCodec::MAX_CHUNK_SIZE).contains(&chunk_size) {
        anyhow::bail!(
            "encryption.chunk_size must be within [{}, {}], got {chunk_size}",
            SealedCodec::MIN_CHUNK_SIZE,
            SealedCodec::MAX_CHUNK_SIZE
        );
    }
    println!("{}", sealed_size(bytes, chunk_size));
    Ok(())
}

fn cmd_keygen() -> Result<()> {
    let key = SecretKey::generate();
    println!("{}", key.to_base64());
    eprintln!("Store this under [encryption] key = \"...\" in ossvault.toml, or export OSSVAULT_KEY.");
    Ok(())
}

fn cmd_config_show(config: &OssVaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(&redacted(config)).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn redacted(config: &OssVaultConfig) -> OssVaultConfig {
    let mut shown = config.clone();
    if shown.encryption.key.is_some() {
        shown.encryption.key = Some("[REDACTED]".into());
    }
    shown
}

fn format_entry(entry: &StorageAttributes) -> String {
    match entry {
        StorageAttributes::File(file) => format!(
            "{:>10}  {:<25}  {}",
            file.file_size.map(fmt_bytes).unwrap_or_else(|| "-".into()),
            file.last_modified.as_deref().unwrap_or("-"),
            file.path
        ),
        StorageAttributes::Directory(dir) => format!("{:>10}  {:<25}  {}/", "DIR", "", dir.path),
    }
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use ossvault_storage::{DirectoryAttributes, FileAttributes};

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_key_after_subcommand() {
        let cli = Cli::try_parse_from(["ossvault", "encrypt", "a", "b", "--key", "Zm9v"]).unwrap();
        assert_eq!(cli.key.as_deref(), Some("Zm9v"));
        assert!(matches!(cli.command, Commands::Encrypt { .. }));
    }

    #[test]
    fn test_ls_defaults() {
        let cli = Cli::try_parse_from(["ossvault", "ls"]).unwrap();
        match cli.command {
            Commands::Ls { prefix, deep, json } => {
                assert_eq!(prefix, "");
                assert!(!deep);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_redacted_hides_key() {
        let mut config = OssVaultConfig::default();
        config.encryption.key = Some(SecretKey::generate().to_base64());
        let shown = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(shown.contains("[REDACTED]"));
        assert!(!shown.contains(config.encryption.key.as_deref().unwrap()));
    }

    #[test]
    fn test_format_entry() {
        let file = StorageAttributes::File(FileAttributes {
            file_size: Some(2048),
            ..FileAttributes::new("docs/a.txt")
        });
        assert!(format_entry(&file).ends_with("docs/a.txt"));
        assert!(format_entry(&file).contains("2.0 KB"));

        let dir = StorageAttributes::Directory(DirectoryAttributes { path: "docs".into() });
        assert!(format_entry(&dir).ends_with("docs/"));
    }

    #[test]
    fn test_size_rejects_out_of_range_chunk() {
        let mut config = OssVaultConfig::default();
        assert!(cmd_size(&config, 10_000).is_ok());
        config.encryption.chunk_size = 16;
        assert!(cmd_size(&config, 10_000).is_err());
    }

    #[test]
    fn test_sealing_codec_requires_key() {
        let err = sealing_codec(&OssVaultConfig::default()).unwrap_err();
        assert!(err.to_string().contains("no encryption key"));
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt_local_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let plain = tmp.path().join("plain.bin");
        let sealed = tmp.path().join("sealed.bin");
        let restored = tmp.path().join("restored.bin");
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
        std::fs::write(&plain, &data).unwrap();

        let mut config = OssVaultConfig::default();
        config.encryption.key = Some(SecretKey::generate().to_base64());

        cmd_encrypt(&config, &plain, &sealed).await.unwrap();
        assert_eq!(
            std::fs::metadata(&sealed).unwrap().len(),
            sealed_size(20_000, config.encryption.chunk_size)
        );
        cmd_decrypt(&config, &sealed, &restored).await.unwrap();
        assert_eq!(std::fs::read(&restored).unwrap(), data);
    }

    #[tokio::test]
    async fn test_decrypt_with_wrong_key_leaves_no_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let plain = tmp.path().join("plain.bin");
        let sealed = tmp.path().join("sealed.bin");
        let restored = tmp.path().join("restored.bin");
        std::fs::write(&plain, b"secret payload").unwrap();

        let mut config = OssVaultConfig::default();
        config.encryption.key = Some(SecretKey::generate().to_base64());
        cmd_encrypt(&config, &plain, &sealed).await.unwrap();

        config.encryption.key = Some(SecretKey::generate().to_base64());
        assert!(cmd_decrypt(&config, &sealed, &restored).await.is_err());
        assert!(!restored.exists(), "partial plaintext must be removed");
    }
}

//! xkem: post-quantum file encryption CLI
//!
//! Commands:
//!   keygen  --out <stem>                  - write <stem>.pub and <stem>.key
//!   encrypt --recipient <pub> <in> [out]  - seal a file (default output: <in>.v)
//!   decrypt --key <key> <in> [out]        - open a container (default: strip .v)
//!   inspect <container>                   - show container framing without a key
//!   config show                           - print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretSlice};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{BufReader, BufWriter};
use tracing::{debug, info};

use xkem_core::{KemVariant, XkemConfig};
use xkem_crypto::{
    decrypt_async, encrypt_async, inspect, DecodeLimits, KemScheme, MlKem1024, MlKem768,
    PassSummary, Primitives,
};

/// Suffix appended to encrypted files
const CONTAINER_EXT: &str = "v";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "xkem",
    version,
    about = "Post-quantum file encryption (ML-KEM + AES-256-GCM)",
    long_about = "xkem: encrypt files to an ML-KEM public key and decrypt them with the matching private key"
)]
struct Cli {
    /// Path to xkem.toml configuration file
    #[arg(long, short = 'c', env = "XKEM_CONFIG", default_value = "xkem.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "XKEM_LOG")]
    log: Option<String>,

    /// Log format; overrides config
    #[arg(long, env = "XKEM_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a recipient keypair
    Keygen {
        /// Output path stem: writes <stem>.pub and <stem>.key
        #[arg(long, short = 'o')]
        out: PathBuf,
        /// KEM parameter set (default: from config)
        #[arg(long)]
        kem: Option<KemVariant>,
        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },

    /// Encrypt a file to a recipient public key
    Encrypt {
        /// Recipient public key file
        #[arg(long, short = 'r')]
        recipient: PathBuf,
        /// File to encrypt
        input: PathBuf,
        /// Output container (default: <input>.v)
        output: Option<PathBuf>,
        /// Plaintext bytes per chunk (default: from config)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Replace an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Decrypt a container with a private key
    Decrypt {
        /// Private key file
        #[arg(long, short = 'k')]
        key: PathBuf,
        /// Container to decrypt
        input: PathBuf,
        /// Output file (default: <input> without the .v suffix)
        output: Option<PathBuf>,
        /// Replace an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Show container framing without decrypting
    Inspect {
        /// Container to inspect
        input: PathBuf,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

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
    let config = XkemConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    match cli.command {
        Commands::Keygen { out, kem, force } => {
            cmd_keygen(&out, kem.unwrap_or(config.crypto.kem), force).await
        }
        Commands::Encrypt {
            recipient,
            input,
            output,
            chunk_size,
            force,
        } => {
            let chunk_size = resolve_chunk_size(config, chunk_size)?;
            cmd_encrypt(&recipient, &input, output.as_deref(), chunk_size, force).await
        }
        Commands::Decrypt {
            key,
            input,
            output,
            force,
        } => {
            let limits = DecodeLimits {
                max_chunk_len: config.crypto.max_chunk_size,
            };
            cmd_decrypt(&key, &input, output.as_deref(), &limits, force).await
        }
        Commands::Inspect { input, json } => {
            let limits = DecodeLimits {
                max_chunk_len: config.crypto.max_chunk_size,
            };
            cmd_inspect(&input, json, &limits)
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

/// Apply a `--chunk-size` override and hold it to the same limits as the
/// config file, so `decrypt` with this config can read what `encrypt` writes.
fn resolve_chunk_size(mut config: XkemConfig, chunk_size: Option<usize>) -> Result<usize> {
    if let Some(size) = chunk_size {
        config.crypto.chunk_size = size;
        config
            .validate()
            .with_context(|| format!("--chunk-size {size} rejected"))?;
    }
    Ok(config.crypto.chunk_size)
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stderr keeps stdout clean for `inspect --json`
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `xkem keygen` ─────────────────────────────────────────────────────────────

async fn cmd_keygen(out: &Path, kem: KemVariant, force: bool) -> Result<()> {
    let pub_path = out.with_extension("pub");
    let key_path = out.with_extension("key");
    if !force {
        for p in [&pub_path, &key_path] {
            if p.exists() {
                anyhow::bail!("{} already exists (use --force to overwrite)", p.display());
            }
        }
    }

    let keypair = match kem {
        KemVariant::MlKem768 => Primitives::<MlKem768>::init()?.generate_keypair()?,
        KemVariant::MlKem1024 => Primitives::<MlKem1024>::init()?.generate_keypair()?,
    };

    tokio::fs::write(&pub_path, &keypair.public_key)
        .await
        .with_context(|| format!("writing public key: {}", pub_path.display()))?;
    write_private_key(&key_path, keypair.private_key.expose_secret())
        .await
        .with_context(|| format!("writing private key: {}", key_path.display()))?;

    info!(kem = %kem, public = %pub_path.display(), "keypair generated");
    println!("Generated {kem} keypair:");
    println!("  public:  {} ({} bytes)", pub_path.display(), kem.public_key_len());
    println!("  private: {} ({} bytes)", key_path.display(), kem.private_key_len());
    Ok(())
}

async fn write_private_key(path: &Path, bytes: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);
    let mut file = opts.open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

// ── `xkem encrypt` ────────────────────────────────────────────────────────────

async fn cmd_encrypt(
    recipient: &Path,
    input: &Path,
    output: Option<&Path>,
    chunk_size: usize,
    force: bool,
) -> Result<()> {
    let public_key = tokio::fs::read(recipient)
        .await
        .with_context(|| format!("reading public key: {}", recipient.display()))?;
    let kem = KemVariant::from_public_key_len(public_key.len()).with_context(|| {
        format!(
            "{}: {} bytes is not an ML-KEM-768 or ML-KEM-1024 public key",
            recipient.display(),
            public_key.len()
        )
    })?;

    let output = output.map(Path::to_path_buf).unwrap_or_else(|| default_encrypt_output(input));
    let staged = StagedOutput::create(&output, force)?;
    let pb = make_spinner("encrypt");
    pb.set_message(format!("{} → {}", input.display(), output.display()));

    let reader = BufReader::new(
        tokio::fs::File::open(input)
            .await
            .with_context(|| format!("opening {}", input.display()))?,
    );
    let mut writer = staged.writer()?;

    let result = match kem {
        KemVariant::MlKem768 => {
            seal_with::<MlKem768>(&public_key, reader, &mut writer, chunk_size).await
        }
        KemVariant::MlKem1024 => {
            seal_with::<MlKem1024>(&public_key, reader, &mut writer, chunk_size).await
        }
    };
    drop(writer);
    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(e).with_context(|| format!("encrypting {}", input.display()));
        }
    };
    staged.commit()?;

    pb.finish_with_message("done");
    println!("  kem:     {kem}");
    println!("  chunks:  {}", summary.chunks);
    println!("  bytes:   {}", fmt_bytes(summary.plaintext_bytes));
    println!("  output:  {}", output.display());
    Ok(())
}

async fn seal_with<K: KemScheme>(
    public_key: &[u8],
    reader: BufReader<tokio::fs::File>,
    writer: &mut BufWriter<tokio::fs::File>,
    chunk_size: usize,
) -> Result<PassSummary> {
    let prims = Primitives::<K>::init()?;
    Ok(encrypt_async(&prims, public_key, reader, writer, chunk_size).await?)
}

// ── `xkem decrypt` ────────────────────────────────────────────────────────────

async fn cmd_decrypt(
    key: &Path,
    input: &Path,
    output: Option<&Path>,
    limits: &DecodeLimits,
    force: bool,
) -> Result<()> {
    let private_key: SecretSlice<u8> = tokio::fs::read(key)
        .await
        .with_context(|| format!("reading private key: {}", key.display()))?
        .into();
    let key_len = private_key.expose_secret().len();
    let kem = KemVariant::from_private_key_len(key_len).with_context(|| {
        format!(
            "{}: {key_len} bytes is not an ML-KEM-768 or ML-KEM-1024 private key",
            key.display()
        )
    })?;

    let output = match output {
        Some(p) => p.to_path_buf(),
        None => default_decrypt_output(input)?,
    };
    let staged = StagedOutput::create(&output, force)?;
    let pb = make_spinner("decrypt");
    pb.set_message(format!("{} → {}", input.display(), output.display()));

    let reader = BufReader::new(
        tokio::fs::File::open(input)
            .await
            .with_context(|| format!("opening {}", input.display()))?,
    );
    let mut writer = staged.writer()?;

    let result = match kem {
        KemVariant::MlKem768 => {
            open_with::<MlKem768>(&private_key, reader, &mut writer, limits).await
        }
        KemVariant::MlKem1024 => {
            open_with::<MlKem1024>(&private_key, reader, &mut writer, limits).await
        }
    };
    drop(writer);
    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(e).with_context(|| format!("decrypting {}", input.display()));
        }
    };
    staged.commit()?;

    pb.finish_with_message("done");
    println!("  kem:     {kem}");
    println!("  chunks:  {}", summary.chunks);
    println!("  bytes:   {}", fmt_bytes(summary.plaintext_bytes));
    println!("  output:  {}", output.display());
    Ok(())
}

async fn open_with<K: KemScheme>(
    private_key: &SecretSlice<u8>,
    reader: BufReader<tokio::fs::File>,
    writer: &mut BufWriter<tokio::fs::File>,
    limits: &DecodeLimits,
) -> Result<PassSummary> {
    let prims = Primitives::<K>::init()?;
    Ok(decrypt_async(&prims, private_key.expose_secret(), reader, writer, limits).await?)
}

// ── `xkem inspect` ────────────────────────────────────────────────────────────

fn cmd_inspect(input: &Path, json: bool, limits: &DecodeLimits) -> Result<()> {
    let file = std::fs::File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let info = inspect(std::io::BufReader::new(file), limits)
        .with_context(|| format!("inspecting {}", input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let kem = info
        .kem_variant
        .map(|v| v.to_string())
        .unwrap_or_else(|| format!("unknown ({}-byte ciphertext)", info.kem_ciphertext_len));
    println!("{}", input.display());
    println!("  magic:      {}", String::from_utf8_lossy(&xkem_crypto::MAGIC));
    println!("  version:    {}", info.version);
    println!("  kem:        {kem}");
    println!("  chunks:     {}", info.chunks);
    println!("  plaintext:  {}", fmt_bytes(info.plaintext_len));
    println!("  container:  {}", fmt_bytes(info.container_len));
    Ok(())
}

// ── `xkem config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &XkemConfig, path: &Path) -> Result<()> {
    if path.exists() {
        println!("# config: {}", path.display());
    } else {
        println!("# config: {} (not found, using defaults)", path.display());
    }
    print!("{}", toml::to_string_pretty(config).context("serializing config")?);
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn default_encrypt_output(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".");
    name.push(CONTAINER_EXT);
    PathBuf::from(name)
}

fn default_decrypt_output(input: &Path) -> Result<PathBuf> {
    match input.extension() {
        Some(ext) if ext == CONTAINER_EXT => Ok(input.with_extension("")),
        _ => anyhow::bail!(
            "{} has no .{CONTAINER_EXT} suffix; pass an output path explicitly",
            input.display()
        ),
    }
}

/// Output written to a temp file beside its destination and renamed over it
/// only by [`StagedOutput::commit`]. Dropping it uncommitted removes the temp
/// file and leaves the destination untouched.
struct StagedOutput {
    dest: PathBuf,
    temp: NamedTempFile,
}

impl StagedOutput {
    fn create(dest: &Path, force: bool) -> Result<Self> {
        if !force && dest.exists() {
            anyhow::bail!("{} already exists (use --force to overwrite)", dest.display());
        }
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".xkem-")
            .tempfile_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        debug!(temp = %temp.path().display(), dest = %dest.display(), "staging output");
        Ok(Self {
            dest: dest.to_path_buf(),
            temp,
        })
    }

    fn writer(&self) -> Result<BufWriter<tokio::fs::File>> {
        let file = self
            .temp
            .as_file()
            .try_clone()
            .with_context(|| format!("opening {}", self.temp.path().display()))?;
        Ok(BufWriter::new(tokio::fs::File::from_std(file)))
    }

    fn commit(self) -> Result<()> {
        let dest = self.dest;
        self.temp
            .persist(&dest)
            .map_err(|e| e.error)
            .with_context(|| format!("writing {}", dest.display()))?;
        Ok(())
    }
}

fn fmt_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

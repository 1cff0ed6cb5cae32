//! sensorctl - MQTT connectivity and OTA tooling for ESP32 sensor nodes
//!
//! Usage:
//!   sensorctl [OPTIONS] <COMMAND>
//!
//! Commands:
//!   probe    Send CONNECT with the configured credentials and report the CONNACK
//!   hash     Compute the SHA-256 of a firmware image
//!   ota      Notify a device that new firmware is available
//!   serve    Serve firmware images and the version manifest over HTTP
//!   token    Mint, verify or decode a device JWT
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sensorctl::config::Config;
use sensorctl::ota::{self, UpdateMessage};
use sensorctl::server::FirmwareServer;
use sensorctl::session;
use sensorctl::token::{self, Expiry};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    fn from_config(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// sensorctl - MQTT and OTA tooling for sensor nodes
#[derive(Parser, Debug)]
#[command(name = "sensorctl")]
#[command(version)]
#[command(about = "MQTT connectivity and OTA tooling for ESP32 sensor nodes")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send CONNECT with the configured credentials and report the CONNACK
    Probe {
        /// Broker address, overrides broker.address
        #[arg(short, long)]
        address: Option<String>,

        /// Client identifier, overrides credentials.client_id
        #[arg(long)]
        client_id: Option<String>,

        /// Username, overrides credentials.username
        #[arg(short, long)]
        username: Option<String>,

        /// Password or JWT, overrides credentials.password
        #[arg(short, long)]
        password: Option<String>,

        /// Keep alive in seconds, overrides broker.keep_alive
        #[arg(short, long)]
        keep_alive: Option<u16>,

        /// Connect and reply timeout in seconds, overrides broker.connect_timeout
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Compute the SHA-256 of a firmware image and write <file>.sha256
    Hash {
        /// Firmware image
        file: PathBuf,
    },

    /// Notify a device that new firmware is available
    Ota {
        /// Firmware version being offered
        version: String,

        /// URL the device downloads the image from
        url: String,

        /// Local firmware image, hashed to produce the signature
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Precomputed SHA-256 signature
        #[arg(short, long, conflicts_with = "file")]
        signature: Option<String>,

        /// Device hostname, overrides device.hostname
        #[arg(long)]
        hostname: Option<String>,

        /// Ask the device to update even if it is already on this version
        #[arg(long)]
        force: bool,

        /// Print the notification instead of publishing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Serve firmware images and the version manifest over HTTP
    Serve {
        /// HTTP bind address, overrides firmware.bind
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Firmware directory, overrides firmware.dir
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Mint, verify or decode a device JWT (defaults to the configured password)
    Token {
        /// Token to inspect
        jwt: Option<String>,

        /// Check the signature against credentials.jwt_secret
        #[arg(long)]
        verify: bool,

        /// Print a fresh token signed with credentials.jwt_secret
        #[arg(long, conflicts_with_all = ["jwt", "verify"])]
        mint: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration file if specified, otherwise defaults plus env overrides
    let loaded = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(2);
        }
    };

    // CLI overrides config, config overrides default (info)
    let log_level = args
        .log_level
        .unwrap_or_else(|| LogLevel::from_config(&config.log.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    match args.command {
        Command::Probe {
            address,
            client_id,
            username,
            password,
            keep_alive,
            timeout,
        } => {
            if let Some(address) = address {
                config.broker.address = address;
            }
            if let Some(client_id) = client_id {
                config.credentials.client_id = client_id;
            }
            if username.is_some() {
                config.credentials.username = username;
            }
            if password.is_some() {
                config.credentials.password = password;
            }
            if let Some(keep_alive) = keep_alive {
                config.broker.keep_alive = keep_alive;
            }
            if let Some(secs) = timeout {
                config.broker.connect_timeout = Duration::from_secs(secs);
            }
            config.validate()?;
            run_probe(&config)
        }
        Command::Hash { file } => {
            let hash = ota::firmware_sha256(&file)?;
            let path = ota::write_hash_file(&file, &hash)?;
            println!("{}", hash);
            info!("Hash written to {}", path.display());
            Ok(())
        }
        Command::Ota {
            version,
            url,
            file,
            signature,
            hostname,
            force,
            dry_run,
        } => {
            let signature = match (signature, file) {
                (Some(signature), _) => signature,
                (None, Some(file)) => {
                    let hash = ota::firmware_sha256(&file)?;
                    info!("SHA-256 of {}: {}", file.display(), hash);
                    hash
                }
                (None, None) => String::new(),
            };
            let message = UpdateMessage::new(version, url, signature)?.with_force_update(force);

            if dry_run {
                println!("{}", message.to_json()?);
                return Ok(());
            }

            let Some(hostname) = hostname.or(config.device.hostname.clone()) else {
                return Err("device hostname is required (--hostname or device.hostname)".into());
            };

            ota::send_update(
                &config.broker.socket_address(),
                &config.connect_request()?,
                &hostname,
                &message,
                config.broker.connect_timeout,
            )?;
            Ok(())
        }
        Command::Serve { bind, dir } => {
            let bind = bind.unwrap_or(config.firmware.bind);
            let dir = dir.unwrap_or_else(|| config.firmware.dir.clone());
            ota::ensure_manifest(&dir, &config.firmware.base_url)?;

            let runtime = tokio::runtime::Runtime::new()?;
            runtime
                .block_on(serve(bind, dir))
                .map_err(|e| e as Box<dyn std::error::Error>)
        }
        Command::Token { jwt, verify, mint } => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let secret = config.credentials.jwt_secret.as_deref();

            if mint {
                let Some(secret) = secret else {
                    return Err("credentials.jwt_secret is not set".into());
                };
                println!("{}", token::mint(&config.device_claims(now), secret.as_bytes())?);
                return Ok(());
            }

            let Some(jwt) = jwt.or(config.password()?) else {
                return Err("no token given and no password or jwt_secret configured".into());
            };
            let claims = if verify {
                let Some(secret) = secret else {
                    return Err("--verify needs credentials.jwt_secret".into());
                };
                let claims = token::verify(&jwt, secret.as_bytes())?;
                info!("Signature valid");
                claims
            } else {
                token::decode_claims(&jwt)?
            };
            println!("{}", claims.to_json_pretty());

            match claims.expiry(now) {
                Expiry::Valid { remaining } => {
                    info!("Token valid for another {}s", remaining.as_secs())
                }
                Expiry::Expired { ago } => warn!("Token expired {}s ago", ago.as_secs()),
            }
            Ok(())
        }
    }
}

async fn serve(
    bind: SocketAddr,
    dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = FirmwareServer::bind(bind, dir).await?;
    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down firmware server");
            Ok(())
        }
    }
}

fn run_probe(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let address = config.broker.socket_address();
    let request = config.connect_request()?;
    info!(
        "Probing {} as '{}' (keep alive {}s)",
        address, request.client_id, request.keep_alive
    );

    match session::probe(&address, &request, config.broker.connect_timeout) {
        Ok(connack) if connack.is_accepted() => {
            println!("accepted: {}", connack.describe());
            Ok(())
        }
        Ok(connack) => {
            println!("rejected: {}", connack.describe());
            std::process::exit(1);
        }
        Err(e) => {
            error!("Probe failed: {}", e);
            std::process::exit(1);
        }
    }
}

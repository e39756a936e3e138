#![deny(unsafe_code)]

//! veilproxy CLI: command-line control plane.

mod render;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use veilproxy_config::{AppConfig, LogLevel};
use veilproxy_core::correlation::CorrelationId;
use veilproxy_core::ipc::server::socket_path_from_config;
use veilproxy_core::ipc::{CommandIssued, IpcClient};
use veilproxy_core::message::{Reply, ResponseCode};
use veilproxy_core::notification::Notification;
use veilproxy_core::{Daemon, LogCollector};

/// veilproxy, an encryption-aware proxy daemon for Matrix clients.
#[derive(Parser)]
#[command(name = "veilproxy", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "veilproxy.toml")]
    config: PathBuf,

    /// Daemon socket; overrides the configured one.
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the veilproxy daemon.
    Start,

    /// Stop a running veilproxy daemon.
    Stop,

    /// Show daemon status.
    Status,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,

        /// Show the configuration of the running daemon instead.
        #[arg(long)]
        running: bool,
    },

    /// Show recent daemon log entries.
    Logs {
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },

    /// List the identities the daemon manages.
    ListUsers,

    /// Export the room keys of an identity to a file.
    ExportKeys(KeyFileArgs),

    /// Import room keys for an identity from a file.
    ImportKeys(KeyFileArgs),

    /// List the devices an identity knows about.
    ListDevices {
        identity: String,
        /// Only show devices of this user.
        user: Option<String>,
    },

    /// Mark a device as verified.
    VerifyDevice(DeviceArgs),

    /// Remove the verified mark of a device.
    UnverifyDevice(DeviceArgs),

    /// Blacklist a device.
    BlacklistDevice(DeviceArgs),

    /// Lift the blacklist of a device.
    UnblacklistDevice(DeviceArgs),

    /// Start an interactive SAS verification.
    StartVerification(DeviceArgs),

    /// Accept a SAS verification started by the other side.
    AcceptVerification(DeviceArgs),

    /// Confirm that the short authentication strings match.
    ConfirmVerification(DeviceArgs),

    /// Cancel a SAS verification.
    CancelVerification(DeviceArgs),

    /// Follow daemon notifications until interrupted.
    Watch {
        /// Only show notifications after this sequence number.
        #[arg(long)]
        after: Option<u64>,

        /// Poll interval in milliseconds.
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

#[derive(Args)]
struct WaitArgs {
    /// Wait up to SECS for the daemon's response.
    #[arg(long, value_name = "SECS")]
    wait: Option<u64>,
}

#[derive(Args)]
struct KeyFileArgs {
    identity: String,
    file: String,
    passphrase: String,
    #[command(flatten)]
    wait: WaitArgs,
}

#[derive(Args)]
struct DeviceArgs {
    /// Managed identity acting on the device.
    identity: String,
    user_id: String,
    device_id: String,
    #[command(flatten)]
    wait: WaitArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config).await?;
    if let Some(socket) = &cli.socket {
        config.daemon.socket_path = Some(socket.to_string_lossy().into_owned());
    }

    if let Commands::Start = cli.command {
        let collector = LogCollector::new(config.bridge.log_history);
        let reader = collector.reader();
        init_tracing(cli.verbose, Some(config.log_level()), Some(collector));
        info!(config = %cli.config.display(), "Starting veilproxy daemon");
        let daemon = Daemon::new(config).with_log_reader(reader);
        return daemon.run().await.context("daemon failed");
    }

    init_tracing(cli.verbose, None, None);
    let client = IpcClient::new(socket_path_from_config(&config));
    run_client_command(cli.command, &cli.config, &config, &client).await
}

async fn run_client_command(
    command: Commands,
    config_path: &Path,
    config: &AppConfig,
    client: &IpcClient,
) -> Result<()> {
    match command {
        Commands::Start => bail!("`start` runs the daemon itself"),
        Commands::Stop => cmd_stop(client).await?,
        Commands::Status => cmd_status(client).await?,
        Commands::Config { show, running } => {
            cmd_config(config_path, config, client, show, running).await?
        }
        Commands::Logs { limit } => {
            for entry in client.logs(limit).await?.entries {
                println!("{}", render::log_line(&entry));
            }
        }
        Commands::ListUsers => {
            println!("veilproxy users:");
            for user in client.list_users().await? {
                println!("  {} {}", user.user_id, user.device_id);
            }
        }
        Commands::ExportKeys(args) => {
            let after = last_seq(client, &args.wait).await?;
            let issued = client
                .export_keys(&args.identity, &args.file, &args.passphrase)
                .await?;
            report(client, issued, after, &args.wait).await?
        }
        Commands::ImportKeys(args) => {
            let after = last_seq(client, &args.wait).await?;
            let issued = client
                .import_keys(&args.identity, &args.file, &args.passphrase)
                .await?;
            report(client, issued, after, &args.wait).await?
        }
        Commands::ListDevices { identity, user } => {
            let devices = match user {
                Some(user) => client.list_user_devices(&identity, &user).await?,
                None => client.list_devices(&identity).await?,
            };
            println!("Devices known to {identity}:");
            print!("{}", render::device_table(&devices));
        }
        Commands::VerifyDevice(args) => {
            device_command(client, &args, IpcClient::verify_device).await?
        }
        Commands::UnverifyDevice(args) => {
            device_command(client, &args, IpcClient::unverify_device).await?
        }
        Commands::BlacklistDevice(args) => {
            device_command(client, &args, IpcClient::blacklist_device).await?
        }
        Commands::UnblacklistDevice(args) => {
            device_command(client, &args, IpcClient::unblacklist_device).await?
        }
        Commands::StartVerification(args) => {
            device_command(client, &args, IpcClient::start_verification).await?
        }
        Commands::AcceptVerification(args) => {
            device_command(client, &args, IpcClient::accept_verification).await?
        }
        Commands::ConfirmVerification(args) => {
            device_command(client, &args, IpcClient::confirm_verification).await?
        }
        Commands::CancelVerification(args) => {
            device_command(client, &args, IpcClient::cancel_verification).await?
        }
        Commands::Watch { after, interval_ms } => {
            cmd_watch(client, after, Duration::from_millis(interval_ms.max(1))).await?
        }
    }

    Ok(())
}

/// `RUST_LOG` wins, then `-v`, then the configured level.
fn init_tracing(verbose: u8, configured: Option<LogLevel>, collector: Option<LogCollector>) {
    let filter = match verbose {
        0 => configured.map_or("warn", LogLevel::as_filter),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(collector)
        .init();
}

async fn cmd_stop(client: &IpcClient) -> Result<()> {
    info!("Sending stop signal to veilproxy daemon");
    let resp = client.stop().await?;
    println!("{}", resp.message);
    Ok(())
}

async fn cmd_status(client: &IpcClient) -> Result<()> {
    let status = client.status().await?;
    println!(
        "veilproxy {} ({}) pid {}, up {}s",
        status.version, status.git_hash, status.pid, status.uptime_secs
    );
    println!("  log level:       {}", status.log_level);
    println!("  identities:      {}", status.identities);
    println!("  cached devices:  {}", status.cached_devices);
    println!("  next command id: {}", status.next_correlation_id);
    println!("  notifications:   {}", status.last_notification_seq);
    for server in &status.servers {
        println!(
            "  [{}] {} -> {}{}",
            server.name,
            server.listen,
            server.homeserver,
            if server.ssl { " (ssl)" } else { "" }
        );
    }
    Ok(())
}

async fn cmd_config(
    config_path: &Path,
    config: &AppConfig,
    client: &IpcClient,
    show: bool,
    running: bool,
) -> Result<()> {
    if running {
        print!("{}", client.config().await?.toml);
        return Ok(());
    }

    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render TOML")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn device_command<'a, F, Fut>(client: &'a IpcClient, args: &'a DeviceArgs, op: F) -> Result<()>
where
    F: FnOnce(&'a IpcClient, &'a str, &'a str, &'a str) -> Fut,
    Fut: Future<Output = Result<CommandIssued, veilproxy_core::ipc::IpcClientError>>,
{
    let after = last_seq(client, &args.wait).await?;
    let issued = op(client, &args.identity, &args.user_id, &args.device_id).await?;
    report(client, issued, after, &args.wait).await
}

/// Sequence to watch from, taken before the command is issued.
async fn last_seq(client: &IpcClient, wait: &WaitArgs) -> Result<u64> {
    if wait.wait.is_none() {
        return Ok(0);
    }
    Ok(client.notifications(u64::MAX, 0).await?.last_seq)
}

async fn report(client: &IpcClient, issued: CommandIssued, after: u64, wait: &WaitArgs) -> Result<()> {
    let Some(secs) = wait.wait else {
        println!("{}", issued.id);
        return Ok(());
    };

    let reply = wait_for_response(client, issued.id, after, Duration::from_secs(secs)).await?;
    match reply.code {
        ResponseCode::Ok => {
            println!("{}", reply.message);
            Ok(())
        }
        code => bail!("{code}: {}", reply.message),
    }
}

/// Poll notifications after `after` until the `Response` carrying `id`.
async fn wait_for_response(
    client: &IpcClient,
    id: CorrelationId,
    mut after: u64,
    timeout: Duration,
) -> Result<Reply> {
    let poll = async {
        loop {
            let resp = client.notifications(after, 100).await?;
            for entry in resp.notifications {
                after = entry.seq;
                if let Notification::Response {
                    id: got, response, ..
                } = entry.notification
                    && got == id
                {
                    return Ok::<_, anyhow::Error>(response);
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(reply) => reply,
        Err(_) => bail!("no response to command {id} within {}s", timeout.as_secs()),
    }
}

async fn cmd_watch(client: &IpcClient, after: Option<u64>, interval: Duration) -> Result<()> {
    let mut after = match after {
        Some(seq) => seq,
        None => client.notifications(u64::MAX, 0).await?.last_seq,
    };
    debug!(after, "Watching notifications");

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = ticker.tick() => {
                let resp = client.notifications(after, 100).await?;
                for entry in resp.notifications {
                    after = entry.seq;
                    println!("{}", render::notification(&entry.notification));
                }
            }
        }
    }
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use veilproxy_test_utils::daemon::TestDaemon;
    use veilproxy_test_utils::fixtures::{ALICE, BOB, BOB_DEVICE};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_device_command_with_wait() {
        let cli = Cli::try_parse_from([
            "veilproxy",
            "--socket",
            "/tmp/x.sock",
            "verify-device",
            "alice",
            "bob",
            "DEV1",
            "--wait",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
        match cli.command {
            Commands::VerifyDevice(args) => {
                assert_eq!(args.identity, "alice");
                assert_eq!(args.device_id, "DEV1");
                assert_eq!(args.wait.wait, Some(5));
            }
            _ => panic!("expected verify-device"),
        }
    }

    #[test]
    fn test_export_keys_requires_passphrase() {
        assert!(
            Cli::try_parse_from(["veilproxy", "export-keys", "alice", "/tmp/keys"]).is_err()
        );
    }

    #[tokio::test]
    async fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).await.unwrap();
        assert!(config.servers.is_empty());
        assert_eq!(
            socket_path_from_config(&config),
            PathBuf::from(veilproxy_core::ipc::DEFAULT_SOCKET_PATH)
        );
    }

    #[tokio::test]
    async fn test_invalid_config_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("veilproxy.toml");
        std::fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();
        let err = load_config(&path).await.unwrap_err();
        assert!(err.to_string().contains("failed to load"));
    }

    #[test_log::test(tokio::test)]
    async fn test_wait_for_response_matches_id() {
        let daemon = TestDaemon::start().await;
        let client = daemon.client();

        let after = client.notifications(u64::MAX, 0).await.unwrap().last_seq;
        let first = client.verify_device(ALICE, BOB, BOB_DEVICE).await.unwrap();
        let second = client.verify_device(ALICE, BOB, BOB_DEVICE).await.unwrap();

        let reply = wait_for_response(&client, second.id, after, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply.code, ResponseCode::Ok);
        assert!(reply.message.contains("already verified"));

        let reply = wait_for_response(&client, first.id, after, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(reply.message.contains("now verified"));

        daemon.shutdown().await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_wait_for_response_times_out() {
        let daemon = TestDaemon::start().await;
        let client = daemon.client();

        let err = wait_for_response(&client, CorrelationId(999), 0, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no response to command 999"));

        daemon.shutdown().await.unwrap();
    }
}

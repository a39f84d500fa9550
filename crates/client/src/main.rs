//! pigpio-client
//!
//! Command line front end for a remote pigpio daemon: query the board,
//! drive pins, send raw commands and watch level changes.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use client::{ClientConfig, Gpio, Mode, PigpioClient, SessionEvent, SessionInfo, WatchEvent};
use common::setup_logging;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pigpio-client")]
#[command(author, version, about = "Talk to a pigpio daemon over the network")]
#[command(long_about = "
Client for the pigpio daemon socket interface. Connects to the command and
notification sockets of a remote Raspberry Pi running pigpiod.

EXAMPLES:
    # Show daemon and board details
    pigpio-client --host raspberrypi info

    # Drive gpio 17 high
    pigpio-client write 17 1

    # Print level changes on gpio 4 and 17 until Ctrl+C
    pigpio-client watch 4 17 --reconnect

    # Raw command (TICK)
    pigpio-client request 16

CONFIGURATION:
    The client looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/pigpio-client/client.toml
    3. /etc/pigpio-client/client.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Daemon host, overrides the config file
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Daemon port, overrides the config file
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Write requests without waiting for earlier responses
    #[arg(long)]
    pipelining: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show daemon version and board details
    Info,
    /// Read the level of a gpio
    Read { gpio: u32 },
    /// Set the level of a gpio (0 or 1)
    Write { gpio: u32, level: u8 },
    /// Get or set the mode of a gpio
    Mode {
        gpio: u32,
        /// "input" or "output"; omit to read the current mode
        mode: Option<String>,
    },
    /// Print the daemon tick in microseconds
    Tick,
    /// Send a raw command and print the result
    Request {
        command: u32,
        #[arg(default_value_t = 0)]
        p1: u32,
        #[arg(default_value_t = 0)]
        p2: u32,
        #[arg(default_value_t = 0)]
        p3: u32,
    },
    /// Print level changes until Ctrl+C
    Watch {
        #[arg(required = true)]
        gpios: Vec<u32>,
        /// Reconnect after the daemon goes away
        #[arg(long)]
        reconnect: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ClientConfig::default();
        let path = ClientConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Load configuration first (to get log level from config if not specified)
    let mut config = if let Some(ref path) = args.config {
        ClientConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ClientConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.client.log_level)
        .to_string();
    setup_logging(&log_level).context("Failed to setup logging")?;

    info!("pigpio-client v{}", env!("CARGO_PKG_VERSION"));
    debug!("Log level: {}", log_level);

    if let Some(host) = args.host {
        config.connection.host = host;
    }
    if let Some(port) = args.port {
        config.connection.port = port;
    }
    if args.pipelining {
        config.connection.pipelining = true;
    }
    config.validate().context("Invalid configuration")?;

    let session = config.session_config();
    let pi = PigpioClient::new(session.clone());
    let info = pi
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", session.address()))?;

    let result = run(&pi, info, args.command.unwrap_or(Command::Info)).await;

    if let Err(e) = pi.end().await {
        warn!("Error closing session: {}", e);
    }
    result
}

async fn run(pi: &PigpioClient, info: SessionInfo, command: Command) -> Result<()> {
    match command {
        Command::Info => print_info(&info),
        Command::Read { gpio } => {
            let gpio = Gpio::new(pi.clone(), gpio).await?;
            println!("{}", gpio.read().await?);
        }
        Command::Write { gpio, level } => {
            let gpio = Gpio::new(pi.clone(), gpio).await?;
            gpio.write(level).await?;
        }
        Command::Mode { gpio, mode } => {
            let gpio = Gpio::new(pi.clone(), gpio).await?;
            match mode {
                Some(mode) => gpio.mode_set(mode.parse::<Mode>()?).await?,
                None => println!("{}", gpio.mode_get().await?),
            }
        }
        Command::Tick => println!("{}", pi.get_current_tick().await?),
        Command::Request {
            command,
            p1,
            p2,
            p3,
        } => {
            let name = protocol::command_name(command).unwrap_or("UNKNOWN");
            let reply = pi
                .request(command, p1, p2, p3)
                .await
                .with_context(|| format!("{} failed", name))?;
            if reply.extension.is_empty() {
                println!("{} -> {}", name, reply.value);
            } else {
                println!("{} -> {} bytes: {:02x?}", name, reply.value, reply.extension.as_ref());
            }
        }
        Command::Watch { gpios, reconnect } => watch(pi, &info, &gpios, reconnect).await?,
    }
    Ok(())
}

fn print_info(info: &SessionInfo) {
    println!("daemon:          {}:{}", info.host, info.port);
    println!("pigpio version:  {}", info.pigpio_version);
    println!("hw revision:     {:#x}", info.hw_version);
    println!("hardware type:   {}", info.hardware_type);
    println!("user gpio mask:  {:#010x}", info.user_gpio_mask);
    println!("pipelining:      {}", info.pipelining);
}

async fn watch(pi: &PigpioClient, info: &SessionInfo, gpios: &[u32], reconnect: bool) -> Result<()> {
    let mut bits = 0u32;
    for &gpio in gpios {
        if !info.is_user_gpio(gpio) {
            bail!("gpio {} is not a user GPIO on this board", gpio);
        }
        bits |= 1 << gpio;
    }

    let mut events = pi.subscribe();
    let (id, mut changes) = pi.watch(bits).await.context("Failed to start notifications")?;
    info!("Watching {:?} (watcher {}). Press Ctrl+C to stop.", gpios, id);

    let mut previous = pi.read_bank1().await? & bits;
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Some(WatchEvent::Change { levels, tick }) => {
                    let changed = (levels & bits) ^ previous;
                    previous = levels & bits;
                    for &gpio in gpios.iter().filter(|&&g| changed & (1 << g) != 0) {
                        println!("{:>10} gpio {:>2} -> {}", tick, gpio, (levels >> gpio) & 1);
                    }
                }
                Some(WatchEvent::Stopped) | None => break,
            },
            event = events.recv() => match event {
                Ok(SessionEvent::Disconnected(reason)) => {
                    warn!("Disconnected: {}", reason);
                    if !reconnect {
                        break;
                    }
                    reconnect_loop(pi).await?;
                }
                Ok(SessionEvent::Error(e)) => warn!("Session error: {}", e),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Missed {} session events", n),
                Err(RecvError::Closed) => break,
            },
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                if let Err(e) = pi.stop_notifications(id).await {
                    debug!("Stopping watcher: {}", e);
                }
                break;
            }
        }
    }
    Ok(())
}

/// Keep trying to connect until it works or Ctrl+C
async fn reconnect_loop(pi: &PigpioClient) -> Result<()> {
    loop {
        tokio::select! {
            result = pi.connect() => match result {
                Ok(info) => {
                    info!("Reconnected to {}:{}", info.host, info.port);
                    return Ok(());
                }
                Err(e) => warn!("Reconnect failed: {}", e),
            },
            _ = signal::ctrl_c() => bail!("Interrupted while reconnecting"),
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

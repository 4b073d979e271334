// rotel test application -- CLI tool for exercising rotel-rs against real
// hardware or the built-in simulator.
//
// Usage:
//   rotel-test-app list
//   rotel-test-app --model RSP-1570 info
//   rotel-test-app --model RA-1572 --port /dev/ttyUSB0 power on
//   rotel-test-app --model RSP-1570 --dialect ascii_v1 --port /dev/ttyUSB0 volume set 40
//   rotel-test-app --model A14 --host 192.168.1.40 --tcp-port 9590 source cd
//   rotel-test-app --model A14 --simulate send DspModeGet
//   rotel-test-app --model RSP-1570 --simulate send VolumeUp --zone 2
//   rotel-test-app --model RA-1572 --simulate -v monitor --duration 30
//   rotel-test-app --model RA-1572 --simulate stress --count 200

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use rand::Rng;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use rotel::device::{RotelBuilder, RotelClient, SubmitOutcome, models};
use rotel::{
    Attribute, ConnectionStatus, DeviceEvent, DeviceModel, Dialect, LogicalCommand, Power, Source,
    Zone,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// rotel test application -- exercises a receiver from the command line.
#[derive(Parser)]
#[command(name = "rotel-test-app", version, about)]
struct Cli {
    /// Model name (e.g. RSP-1570, RA-1572, A14).
    /// Required for all commands except `list`.
    #[arg(long)]
    model: Option<String>,

    /// Protocol dialect: hex, ascii_v1, ascii_v2. Defaults to the model's.
    #[arg(long)]
    dialect: Option<String>,

    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    #[arg(long)]
    port: Option<String>,

    /// Override the default baud rate for this model.
    #[arg(long)]
    baud: Option<u32>,

    /// Host name or address of an IP-connected device.
    #[arg(long)]
    host: Option<String>,

    /// TCP port of the device (with --host).
    #[arg(long)]
    tcp_port: Option<u16>,

    /// Talk to a simulated device instead of real hardware.
    #[arg(long)]
    simulate: bool,

    /// Seconds between connection checks.
    #[arg(long, default_value_t = 60)]
    poll_secs: u64,

    /// Log verbosity: -v for debug, -vv for trace.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all catalogued models.
    List,

    /// Print the capability descriptor of the selected model.
    Info,

    /// Power the main zone (or --zone N) on or off.
    Power {
        #[arg(value_enum)]
        action: OnOff,

        #[arg(long, default_value_t = 1)]
        zone: u8,
    },

    /// Volume operations.
    Volume {
        #[command(subcommand)]
        action: VolumeAction,

        #[arg(long, default_value_t = 1)]
        zone: u8,
    },

    /// Mute operations.
    Mute {
        #[arg(value_enum)]
        action: MuteAction,

        #[arg(long, default_value_t = 1)]
        zone: u8,
    },

    /// Select a source by token (e.g. cd, tuner, video1, multi_input).
    Source {
        name: String,

        #[arg(long, default_value_t = 1)]
        zone: u8,
    },

    /// Send any logical command by name (e.g. VolumeUp, BassSet, SourceSelect(cd)).
    Send {
        command: String,

        /// Argument for commands that take one.
        value: Option<i32>,

        #[arg(long, default_value_t = 1)]
        zone: u8,
    },

    /// Print the current session state.
    State,

    /// Subscribe to device events and print them in real time.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Stress test: random volume set-points through the sequencer.
    Stress {
        #[arg(long, default_value_t = 100)]
        count: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OnOff {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
enum MuteAction {
    On,
    Off,
    Toggle,
}

#[derive(Subcommand)]
enum VolumeAction {
    Up,
    Down,
    /// Set an absolute level.
    Set { level: i32 },
}

/// Attributes shown by `state`, in display order.
const STATE_ATTRIBUTES: [Attribute; 23] = [
    Attribute::Power,
    Attribute::Source,
    Attribute::RecordSource,
    Attribute::Volume,
    Attribute::Mute,
    Attribute::FixedVolume,
    Attribute::Bass,
    Attribute::Treble,
    Attribute::Balance,
    Attribute::ToneBypass,
    Attribute::Dsp,
    Attribute::PlayStatus,
    Attribute::Track,
    Attribute::Random,
    Attribute::Repeat,
    Attribute::Frequency,
    Attribute::Preset,
    Attribute::Dimmer,
    Attribute::Speakers,
    Attribute::Line1,
    Attribute::Line2,
    Attribute::Model,
    Attribute::Version,
];

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn selected_model(cli: &Cli) -> Result<DeviceModel> {
    let Some(name) = cli.model.as_deref() else {
        bail!("--model is required (see `rotel-test-app list`)");
    };
    models::model_by_name(name)
        .with_context(|| format!("unknown model '{name}' (see `rotel-test-app list`)"))
}

fn zone_arg(model: &DeviceModel, number: u8) -> Result<Zone> {
    let zone = Zone::from_display_number(number)
        .with_context(|| format!("invalid zone {number}"))?;
    if !model.has_zone(zone) {
        bail!("{} has no zone {number}", model.name);
    }
    Ok(zone)
}

async fn create_client(cli: &Cli, model: DeviceModel) -> Result<RotelClient> {
    let mut builder = RotelBuilder::new(model)
        .simulate(cli.simulate)
        .poll_interval(Duration::from_secs(cli.poll_secs.max(1)));
    if let Some(dialect) = &cli.dialect {
        let dialect: Dialect = dialect
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("invalid --dialect")?;
        builder = builder.dialect(dialect);
    }
    if let Some(port) = &cli.port {
        builder = builder.serial_port(port);
    }
    if let Some(baud) = cli.baud {
        builder = builder.baud_rate(baud);
    }
    if let Some(host) = &cli.host {
        builder = builder.host(host);
    }
    if let Some(port) = cli.tcp_port {
        builder = builder.tcp_port(port);
    }
    debug!(simulate = cli.simulate, port = ?cli.port, host = ?cli.host, "connecting");
    builder.build().await.context("failed to build client")
}

/// Wait for the first connection attempt to settle.
async fn wait_online(client: &RotelClient) -> Result<()> {
    let mut events = client.subscribe();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !client.status().is_online() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(DeviceEvent::ConnectionStatusChanged { status, reason })) => match status {
                ConnectionStatus::Online => break,
                ConnectionStatus::OfflineConfigError => {
                    bail!("configuration error: {reason}")
                }
                ConnectionStatus::OfflineCommError => {
                    bail!("device not reachable: {reason}")
                }
            },
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => bail!("device did not come online"),
        }
    }
    Ok(())
}

fn report(outcome: SubmitOutcome, what: &str) -> Result<()> {
    match outcome {
        SubmitOutcome::Sent => println!("{what}: sent"),
        SubmitOutcome::Ignored => println!("{what}: ignored (not applicable in the current state)"),
        SubmitOutcome::Unsupported => bail!("{what}: not supported by this model and dialect"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_list() -> Result<()> {
    let all = models::all_models();
    let name_width = all.iter().map(|m| m.name.len()).max().unwrap_or(8).max(8);

    println!("{:<name_width$}  {:<8}  {:>5}  Dialects", "Model", "Default", "Zones");
    println!(
        "{:<name_width$}  {:<8}  {:>5}  --------",
        "-".repeat(name_width),
        "-------",
        "-----"
    );
    for model in &all {
        let dialects = model
            .dialects
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<name_width$}  {:<8}  {:>5}  {}",
            model.name,
            model.default_dialect.to_string(),
            model.extra_zones + 1,
            dialects
        );
    }
    Ok(())
}

fn cmd_info(model: &DeviceModel) -> Result<()> {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let range = |r: Option<rotel::LevelRange>| match r {
        Some(r) => format!("{} .. {}", r.min, r.max),
        None => "-".to_string(),
    };

    println!("Model Information");
    println!("  Name:           {}", model.name);
    println!(
        "  Dialects:       {}",
        model
            .dialects
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Default:        {}", model.default_dialect);
    println!("  Baud rate:      {}", model.default_baud_rate);
    println!();
    println!("Capabilities");
    println!("  Zones:          {}", model.extra_zones + 1);
    println!("  Zone commands:  {}", yes_no(model.direct_zone_commands));
    println!("  Volume:         {}", range(model.volume));
    println!("  Tone:           {}", range(model.tone_range()));
    println!("  Balance:        {}", range(model.balance_range()));
    println!("  Dimmer:         {}", range(model.dimmer));
    println!("  DSP:            {}", yes_no(model.has_dsp));
    println!("  Play control:   {}", yes_no(model.has_play_control));
    println!("  Frequency:      {}", yes_no(model.has_frequency));
    println!("  Speakers A/B:   {}", yes_no(model.has_speaker_groups));
    println!(
        "  Sources:        {}",
        model
            .sources
            .iter()
            .map(|e| e.source.token())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

async fn cmd_send(client: &RotelClient, zone: Zone, name: &str, value: Option<i32>) -> Result<()> {
    let model = client.describe_model();
    let cmd = model
        .commands
        .entries(client.dialect())
        .filter(|(z, _, _)| *z == zone)
        .map(|(_, cmd, _)| cmd)
        .find(|cmd| cmd.to_string().eq_ignore_ascii_case(name));
    let Some(cmd) = cmd else {
        bail!("{} has no command '{name}' for {zone} in {}", model.name, client.dialect());
    };
    if cmd.takes_value() && value.is_none() {
        bail!("{cmd} needs a value");
    }
    let outcome = client.submit(zone, cmd, value).await?;
    report(outcome, &cmd.to_string())
}

async fn cmd_state(client: &RotelClient) -> Result<()> {
    // Give the power-on refresh a moment to land.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let state = client.snapshot().await;
    let model = client.describe_model();

    println!("Status: {}", client.status());
    for zone in model.zones() {
        println!();
        println!("[{zone}]");
        for attribute in STATE_ATTRIBUTES {
            let value = state.value(zone, attribute);
            if !value.is_undefined() {
                println!("  {:<14}{}", attribute.to_string(), value);
            }
        }
    }
    Ok(())
}

async fn cmd_monitor(client: &RotelClient, duration_secs: u64) -> Result<()> {
    let mut event_rx = client.subscribe();

    println!("Monitoring device events (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        match tokio::time::timeout(timeout, event_rx.recv()).await {
            Ok(Ok(DeviceEvent::StateChanged { zone, attribute, value })) => {
                println!("[{zone}] {attribute} = {value}");
            }
            Ok(Ok(DeviceEvent::ConnectionStatusChanged { status, reason })) => {
                println!("[status] {status} {reason}");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("[warning] missed {n} events (consumer too slow)");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => {
                if deadline.is_some() {
                    println!("Monitor duration elapsed.");
                }
                break;
            }
        }
    }

    Ok(())
}

async fn cmd_stress(client: &RotelClient, count: u32) -> Result<()> {
    let Some(range) = client.describe_model().volume else {
        bail!("{} has no volume control", client.describe_model().name);
    };
    if client.snapshot().await.power(Zone::MAIN) != Power::On {
        client
            .submit(Zone::MAIN, LogicalCommand::PowerOn, None)
            .await?;
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    println!("Stress test: {count} volume set-points in {} .. {}", range.min, range.max);

    let mut rng = rand::thread_rng();
    let mut sent = 0u32;
    let mut skipped = 0u32;
    let mut failures = 0u32;
    let start = Instant::now();

    for i in 1..=count {
        let target = rng.gen_range(range.min..=range.max);
        match client
            .submit(Zone::MAIN, LogicalCommand::VolumeSet, Some(target))
            .await
        {
            Ok(SubmitOutcome::Sent) => sent += 1,
            Ok(_) => skipped += 1,
            Err(e) => {
                eprintln!("[{i}/{count}] volume {target} failed: {e}");
                failures += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        f64::from(count) / elapsed.as_secs_f64()
    } else {
        0.0
    };

    // Let the last feedback arrive before reading back.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let final_volume = client.snapshot().await.zone(Zone::MAIN).volume;

    println!();
    println!("Results:");
    println!("  Total:          {count}");
    println!("  Sent:           {sent}");
    println!("  Skipped:        {skipped}");
    println!("  Failures:       {failures}");
    println!("  Elapsed:        {:.3} s", elapsed.as_secs_f64());
    println!("  Rate:           {rate:.1} commands/sec");
    println!("  Final volume:   {final_volume}");

    if failures > 0 {
        bail!("{failures} out of {count} set-points failed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // `list` and `info` do not need a device.
    if matches!(cli.command, Command::List) {
        return cmd_list();
    }
    let model = selected_model(&cli)?;
    if matches!(cli.command, Command::Info) {
        return cmd_info(&model);
    }

    let client = create_client(&cli, model).await?;
    let result = run(&cli, &client).await;
    client.shutdown().await;
    result
}

async fn run(cli: &Cli, client: &RotelClient) -> Result<()> {
    wait_online(client).await?;
    let model = client.describe_model();

    match &cli.command {
        Command::Power { action, zone } => {
            let zone = zone_arg(model, *zone)?;
            let cmd = match action {
                OnOff::On => LogicalCommand::PowerOn,
                OnOff::Off => LogicalCommand::PowerOff,
            };
            report(client.submit(zone, cmd, None).await?, &format!("{zone} {cmd}"))
        }
        Command::Volume { action, zone } => {
            let zone = zone_arg(model, *zone)?;
            let (cmd, value) = match action {
                VolumeAction::Up => (LogicalCommand::VolumeUp, None),
                VolumeAction::Down => (LogicalCommand::VolumeDown, None),
                VolumeAction::Set { level } => (LogicalCommand::VolumeSet, Some(*level)),
            };
            report(client.submit(zone, cmd, value).await?, &format!("{zone} {cmd}"))
        }
        Command::Mute { action, zone } => {
            let zone = zone_arg(model, *zone)?;
            let cmd = match action {
                MuteAction::On => LogicalCommand::MuteOn,
                MuteAction::Off => LogicalCommand::MuteOff,
                MuteAction::Toggle => LogicalCommand::MuteToggle,
            };
            report(client.submit(zone, cmd, None).await?, &format!("{zone} {cmd}"))
        }
        Command::Source { name, zone } => {
            let zone = zone_arg(model, *zone)?;
            let source: Source = name
                .parse()
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("unknown source '{name}'"))?;
            let cmd = LogicalCommand::SourceSelect(source);
            report(client.submit(zone, cmd, None).await?, &format!("{zone} {cmd}"))
        }
        Command::Send { command, value, zone } => {
            let zone = zone_arg(model, *zone)?;
            cmd_send(client, zone, command, *value).await
        }
        Command::State => cmd_state(client).await,
        Command::Monitor { duration } => cmd_monitor(client, *duration).await,
        Command::Stress { count } => cmd_stress(client, *count).await,
        Command::List | Command::Info => unreachable!("handled before connecting"),
    }
}

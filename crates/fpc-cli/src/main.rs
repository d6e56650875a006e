//! Scripted fingerprint session against the emulated device.
//!
//! Enrolls one finger, authenticates with it, lists the group and removes
//! every print, printing each callback event as one JSON line.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fpc_core::{GroupId, PrintId, RequestStatus};
use fpc_hardware::mock::{EmulatorConfig, EmulatorHandle, MockSecureEnvironment, emulated_device};
use fpc_service::{BiometricsFingerprint, CallbackEvent, ChannelCallback, HalConfig};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fpc-hal", version, about = "Run a scripted session against the emulated sensor")]
struct Args {
    /// JSON configuration file. Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the template database.
    #[arg(long, default_value_os_t = std::env::temp_dir().join("fpc-hal"))]
    storage: PathBuf,

    /// Good touches the emulated trustlet needs per enrollment.
    #[arg(long, default_value_t = 4)]
    enroll_touches: u32,

    /// Emulated finger used for the session.
    #[arg(long, default_value_t = 1)]
    finger: u32,

    /// Operation id bound into the authentication token.
    #[arg(long, default_value_t = 0x4650_4331)]
    operation_id: u64,
}

type Hal = BiometricsFingerprint<MockSecureEnvironment>;

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => HalConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HalConfig::default(),
    };

    std::fs::create_dir_all(&args.storage)
        .with_context(|| format!("creating {}", args.storage.display()))?;
    let storage = args
        .storage
        .to_str()
        .context("storage path is not valid UTF-8")?;

    let (env, sensor, device) = emulated_device(EmulatorConfig {
        enroll_touches: args.enroll_touches,
        ..EmulatorConfig::default()
    });
    let hal = BiometricsFingerprint::open(env, sensor, config)?;
    let (callback, mut events) = ChannelCallback::new();
    let device_id = hal.set_notification_callback(callback)?;
    info!(device = %device_id, storage, "emulated fingerprint device ready");

    let gid = GroupId(0);
    expect_ok("set_active_group", hal.set_active_group(gid, storage)?)?;

    let print = enroll(&hal, &device, &mut events, gid, &args)?;
    info!(print = %print, "finger enrolled");

    expect_ok("authenticate", hal.authenticate(args.operation_id, gid)?)?;
    device.touch(args.finger)?;
    wait_for_terminal(&mut events)?;

    expect_ok("enumerate", hal.enumerate()?)?;
    drain(&mut events)?;

    expect_ok("remove", hal.remove(gid, PrintId::NONE)?)?;
    drain(&mut events)?;

    info!(authenticator_id = hal.get_authenticator_id()?, "session finished");
    Ok(())
}

fn enroll(
    hal: &Hal,
    device: &EmulatorHandle,
    events: &mut UnboundedReceiver<CallbackEvent>,
    gid: GroupId,
    args: &Args,
) -> Result<PrintId> {
    let challenge = hal.pre_enroll()?;
    let token = device.mint_auth_token(challenge, u64::from(gid.0));
    expect_ok("enroll", hal.enroll(&token.to_bytes(), gid, 60)?)?;

    for _ in 0..args.enroll_touches.max(1) {
        device.touch(args.finger)?;
    }
    let print = match wait_for_terminal(events)? {
        CallbackEvent::EnrollResult { print, .. } => print,
        other => bail!("enrollment ended with {other:?}"),
    };
    expect_ok("post_enroll", hal.post_enroll()?)?;
    Ok(print)
}

fn expect_ok(operation: &str, status: RequestStatus) -> Result<()> {
    if status != RequestStatus::SysOk {
        bail!("{operation} returned {status:?}");
    }
    Ok(())
}

fn print_event(event: &CallbackEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

/// Print events until one that ends a capture loop.
fn wait_for_terminal(events: &mut UnboundedReceiver<CallbackEvent>) -> Result<CallbackEvent> {
    loop {
        let event = events
            .blocking_recv()
            .context("callback channel closed")?;
        print_event(&event)?;
        match &event {
            CallbackEvent::EnrollResult { remaining: 0, .. } | CallbackEvent::Error { .. } => {
                return Ok(event);
            }
            CallbackEvent::Authenticated { print, .. } if !print.is_none() => return Ok(event),
            _ => {}
        }
    }
}

/// Print events that are already queued.
fn drain(events: &mut UnboundedReceiver<CallbackEvent>) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        print_event(&event)?;
    }
    Ok(())
}

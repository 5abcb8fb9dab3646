use std::path::PathBuf;
use std::time::Duration;

use livepreview_lib::bus::BusRole;
use livepreview_lib::client::{ClientUpdate, PreviewClient};
use livepreview_lib::config::AgentConfig;
use livepreview_lib::{connect_bus, init_tracing};

const USAGE: &str = "usage: preview_probe [--file <path>] [--wait-secs <n>] [--probe-only]";

#[derive(Debug)]
struct ProbeOptions {
    file: Option<PathBuf>,
    wait: Duration,
    probe_only: bool,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("preview probe failed: {error}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<ProbeOptions, String> {
    let mut options = ProbeOptions {
        file: None,
        wait: Duration::from_secs(30),
        probe_only: false,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--file" => {
                let value = args.next().ok_or("--file needs a path")?;
                options.file = Some(PathBuf::from(value));
            }
            "--wait-secs" => {
                let value = args.next().ok_or("--wait-secs needs a number")?;
                let secs = value
                    .parse::<u64>()
                    .map_err(|e| format!("invalid --wait-secs value '{value}': {e}"))?;
                options.wait = Duration::from_secs(secs);
            }
            "--probe-only" => options.probe_only = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("unknown argument '{other}'\n{USAGE}")),
        }
    }
    if options.file.is_none() && !options.probe_only {
        return Err(format!("--file is required unless --probe-only is set\n{USAGE}"));
    }
    Ok(options)
}

async fn run() -> Result<(), String> {
    let options = parse_args()?;
    init_tracing();
    let config = AgentConfig::from_env().map_err(|e| e.to_string())?;
    let bus = connect_bus(&config, BusRole::Client)
        .await
        .map_err(|e| e.to_string())?;

    let launched = bus.is_agent_launched().await;
    println!("agent launched: {launched}");
    if options.probe_only {
        return Ok(());
    }

    let file = options.file.ok_or(USAGE)?;
    let file = std::fs::canonicalize(&file).unwrap_or(file);
    let (client, mut updates) = PreviewClient::attach(bus, &file);
    client.request_preview().map_err(|e| e.to_string())?;
    println!("requested previews for {}", file.display());

    let deadline = tokio::time::sleep(options.wait);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            update = updates.recv() => {
                let Some(update) = update else { break };
                match update {
                    ClientUpdate::Previews(change) => {
                        for preview in client.previews() {
                            println!(
                                "  {} \"{}\" {}x{}",
                                preview.class_name, preview.title, preview.width, preview.height
                            );
                        }
                        println!(
                            "  +{} ~{} -{}",
                            change.inserted.len(),
                            change.updated.len(),
                            change.removed.len()
                        );
                    }
                    ClientUpdate::Status(status) => println!("status: {status}"),
                    ClientUpdate::AccessNotGranted => {
                        println!("access not granted");
                        break;
                    }
                    other => println!("{other:?}"),
                }
            }
        }
    }
    Ok(())
}

use std::{
    io::{self, BufReader},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;

use asl_stream::{
    AppConfig, StreamSession,
    controller::{spawn_console, spawn_reporter},
    pipeline::RasterSurface,
    session::transport::WsConnector,
};

/// Streams the camera to a sign-recognition service and prints what comes back.
#[derive(Parser, Debug)]
#[command(name = "asl-stream", version, about)]
struct Args {
    /// TOML configuration file. Defaults to `asl-stream.toml` when present.
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    log::info!("streaming to {}", config.endpoint);

    let (updates_tx, updates_rx) = unbounded();
    let mut session = StreamSession::new(&config, WsConnector, RasterSurface::default())
        .with_updates(updates_tx);

    attach_camera(&mut session, &config);

    if let Some(path) = config.overlay.snapshot_path.clone() {
        log::info!("writing overlay snapshots to {}", path.display());
        session.set_overlay_hook(move |surface: &RasterSurface| {
            if let Err(err) = surface.save_png(&path) {
                log::warn!("{err:#}");
            }
        });
    }

    let handle = session.handle();
    let reporter = spawn_reporter(updates_rx);
    // Not joined: it sits in a blocking stdin read until the process exits.
    let _console = spawn_console(handle.clone(), BufReader::new(io::stdin()));
    println!("commands: c(onnect), d(isconnect), q(uit)");

    handle.request_connect();
    session.run();

    drop(session);
    let _ = reporter.join();
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
fn attach_camera(session: &mut StreamSession, config: &AppConfig) {
    use asl_stream::pipeline::camera::{available_cameras, open_camera};

    match available_cameras() {
        Ok(devices) => {
            for device in devices {
                log::debug!("camera {}: {}", device.index, device.label);
            }
        }
        Err(err) => log::debug!("failed to list cameras: {err:#}"),
    }

    match open_camera(&config.camera) {
        Ok(stream) => session.attach_source(stream),
        Err(err) => session.report_device_unavailable(&format!("{err:#}")),
    }
}

#[cfg(not(feature = "camera-nokhwa"))]
fn attach_camera(session: &mut StreamSession, _config: &AppConfig) {
    session.report_device_unavailable("built without camera support");
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn config_path_is_optional_positional() {
        let args = Args::try_parse_from(["asl-stream"]).unwrap();
        assert_eq!(args.config, None);

        let args = Args::try_parse_from(["asl-stream", "lab.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("lab.toml")));

        assert!(Args::try_parse_from(["asl-stream", "a.toml", "b.toml"]).is_err());
    }
}

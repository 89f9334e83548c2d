//! Operator CLI for the camrig rig.
//!
//! Runs the single control/render tick over a simulated device backend:
//! poll one command, advance every session, render the bird's-eye view.
//! Commands (one per line on stdin):
//!
//! - `1`–`9`  select camera
//! - `c`      capture a calibration frame
//! - `s`      compute intrinsics and save the calibration
//! - `p`      estimate the camera pose against the homed board
//! - `t`      capture a still image
//! - `d`      toggle the depth view flag
//! - `o`      comparison overlay (other cameras projected into the selected one)
//! - `m`      wave the simulated board (move it to the next calibration pose)
//! - `h`      home the simulated board onto the world origin
//! - `q`      quit

mod sim;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use camrig_rig::{
    comparison_markers, compose_scene, render_scene, CalibrationStore, Display,
    JsonCalibrationStore, RigConfig, SessionRegistry,
};
use clap::Parser;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_cross_mut;

use sim::{SimBackend, SimWorld};

#[derive(Debug, Parser)]
#[command(name = "camrig", about = "Multi-camera rig calibration and fusion")]
struct Args {
    /// Number of simulated cameras.
    #[arg(long, default_value_t = 3)]
    devices: usize,

    /// Directory for per-camera calibration records.
    #[arg(long, default_value = "calibration")]
    storage_dir: PathBuf,

    /// Directory for rendered output images.
    #[arg(long, default_value = "out")]
    output_dir: PathBuf,

    /// Render the bird's-eye view every N ticks.
    #[arg(long, default_value_t = 10)]
    render_every: u64,
}

/// Display collaborator that writes PNGs into the output directory.
struct PngDisplay {
    dir: PathBuf,
}

impl Display for PngDisplay {
    fn show(&mut self, window: &str, image: &RgbImage) {
        let name = window.replace(' ', "_");
        let path = self.dir.join(format!("{name}.png"));
        if let Err(e) = image.save(&path) {
            log::warn!("could not write {path:?}: {e}");
        } else {
            log::info!("wrote {path:?}");
        }
    }
}

fn spawn_stdin_reader() -> Receiver<char> {
    let (tx, rx) = channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if let Some(ch) = line.trim().chars().next() {
                if tx.send(ch).is_err() {
                    break;
                }
            }
        }
    });
    rx
}

fn dispatch(
    command: char,
    registry: &mut SessionRegistry,
    store: &dyn CalibrationStore,
    display: &mut PngDisplay,
    world: &SimWorld,
) -> bool {
    match command {
        '1'..='9' => {
            registry.select(command.to_digit(10).unwrap());
        }
        'c' => match registry.active_mut().capture_calibration_frame() {
            Ok(count) => log::info!("captured calibration frame ({count} buffered)"),
            Err(e) => log::warn!("capture failed: {e}"),
        },
        's' => {
            let id = registry.active_id();
            match registry.active_mut().compute_and_save(store) {
                Ok(()) => log::info!("camera {id}: calibration computed and saved"),
                Err(e) => log::warn!("camera {id}: calibration failed: {e}"),
            }
        }
        'p' => {
            let id = registry.active_id();
            match registry.active_mut().estimate_pose() {
                Ok(()) => {
                    log::info!("camera {id}: pose estimated");
                    // Keep the stored record in sync with the new pose.
                    if let Err(e) = registry.active().calibrator().save_to(store, id) {
                        log::warn!("camera {id}: could not persist pose: {e}");
                    }
                }
                Err(e) => log::warn!("camera {id}: pose estimation failed: {e}"),
            }
        }
        't' => {
            if let Err(e) = registry.active_mut().capture_still(true, display) {
                log::warn!("still capture failed: {e}");
            }
        }
        'd' => {
            let on = registry.active_mut().toggle_depth_view();
            log::info!(
                "camera {}: depth view {}",
                registry.active_id(),
                if on { "on" } else { "off" }
            );
        }
        'o' => show_comparison(registry, display),
        'm' => world.wave_board(),
        'h' => world.home_board(),
        'q' => return false,
        other => log::warn!("unknown command {other:?}"),
    }
    true
}

/// Render the comparison overlay: the selected camera's still with the world
/// origin and every other posed camera marked on it.
fn show_comparison(registry: &mut SessionRegistry, display: &mut PngDisplay) {
    let selected_id = registry.active_id();

    let frame = match registry.active_mut().capture_still(false, &mut camrig_rig::NullDisplay) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("comparison overlay: no frame: {e}");
            return;
        }
    };

    let Some(overlay) = comparison_markers(registry, selected_id) else {
        log::warn!("comparison overlay: camera {selected_id} has no pose yet");
        return;
    };

    let mut canvas = frame.color.clone();
    if let Some(origin) = overlay.origin_marker {
        draw_cross_mut(&mut canvas, Rgb([0, 255, 0]), origin.x as i32, origin.y as i32);
    }
    for (id, marker) in &overlay.camera_markers {
        draw_cross_mut(&mut canvas, Rgb([255, 0, 255]), marker.x as i32, marker.y as i32);
        log::info!("camera {id} projects to ({:.1}, {:.1})", marker.x, marker.y);
    }

    display.show(&format!("camera {selected_id} comparison"), &canvas);
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.output_dir).context("create output dir")?;

    let world = SimWorld::new();
    let backend = SimBackend::new(args.devices);
    let store = JsonCalibrationStore::new(&args.storage_dir);
    let mut display = PngDisplay {
        dir: args.output_dir.clone(),
    };

    let mut registry = {
        let world = world.clone();
        SessionRegistry::discover(
            &backend,
            |descriptor| backend.detector_for(descriptor, world.clone()),
            &RigConfig::default(),
        )
        .context("device discovery")?
    };

    // Restore any calibration saved by a previous run.
    for session in registry.sessions_mut() {
        match session.load_calibration(&store) {
            Ok(true) => {}
            Ok(false) => log::info!("camera {}: no stored calibration", session.friendly_id()),
            Err(e) => log::warn!("camera {}: {e}", session.friendly_id()),
        }
    }

    let commands = spawn_stdin_reader();
    let mut tick: u64 = 0;

    loop {
        match commands.try_recv() {
            Ok(command) => {
                if !dispatch(command, &mut registry, &store, &mut display, &world) {
                    break;
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        registry.update_all();

        tick += 1;
        if tick % args.render_every == 0 {
            let scene = compose_scene(&registry);
            let canvas = render_scene(&scene);
            let path = args.output_dir.join("birds_eye.png");
            if let Err(e) = canvas.save(&path) {
                log::warn!("could not write {path:?}: {e}");
            }
        }

        thread::sleep(Duration::from_millis(33));
    }

    log::info!("bye");
    Ok(())
}

//! Multi-camera fusion: the bird's-eye view and the comparison overlay.
//!
//! Scene composition is pure geometry and separately testable; rasterisation
//! into an [`RgbImage`] is a thin layer on `imageproc::drawing`.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use camrig_core::{project_points, Pt2, Pt3, Real};

use crate::registry::{SessionRegistry, WorldAnchor};

/// Square canvas edge length in pixels.
pub const CANVAS_SIZE: u32 = 512;
/// Canvas centre: where the world origin lands.
pub const CANVAS_CENTER: (Real, Real) = (256.0, 256.0);
/// Top-down scale: canvas pixels per world metre.
pub const WORLD_SCALE: Real = 100.0;

/// Fixed per-camera palette, indexed by `friendly_id - 1`.
const PALETTE: [Rgb<u8>; 3] = [Rgb([255, 0, 0]), Rgb([0, 255, 0]), Rgb([0, 0, 255])];
/// Colour used for cameras beyond the palette's range.
const FALLBACK_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Colour for a camera by friendly ID.
///
/// IDs 1–3 map onto the fixed palette; any other ID (including 0) gets the
/// white fallback. The palette deliberately does not wrap: on rigs larger
/// than the palette, extra cameras are uniformly white rather than silently
/// reusing another camera's colour.
pub fn palette_color(friendly_id: u32) -> Rgb<u8> {
    match friendly_id {
        1..=3 => PALETTE[friendly_id as usize - 1],
        _ => FALLBACK_COLOR,
    }
}

/// One posed camera in the top-down scene: its position dot and the two
/// axis-line endpoints, all in canvas coordinates.
#[derive(Debug, Clone, Copy)]
pub struct CameraGlyph {
    pub friendly_id: u32,
    pub position: (f32, f32),
    pub forward: (f32, f32),
    pub lateral: (f32, f32),
    pub color: Rgb<u8>,
}

/// One detection dot in canvas coordinates.
#[derive(Debug, Clone, Copy)]
pub struct DetectionDot {
    pub friendly_id: u32,
    pub position: (f32, f32),
    pub color: Rgb<u8>,
}

/// The composed top-down scene for one tick.
#[derive(Debug, Clone, Default)]
pub struct FusedScene {
    pub cameras: Vec<CameraGlyph>,
    pub detections: Vec<DetectionDot>,
    /// Sessions left out because they have no valid pose yet. Their
    /// detections are omitted from the fused view (known limitation).
    pub skipped_sessions: usize,
}

/// Markers for the comparison overlay on the selected camera's image.
#[derive(Debug, Clone)]
pub struct ComparisonOverlay {
    /// The world origin, projected into the selected camera.
    pub origin_marker: Option<Pt2>,
    /// Every *other* posed camera's world position, projected into the
    /// selected camera, with its friendly ID.
    pub camera_markers: Vec<(u32, Pt2)>,
}

fn to_canvas(x: Real, y: Real) -> (f32, f32) {
    (
        (x * WORLD_SCALE + CANVAS_CENTER.0) as f32,
        (y * WORLD_SCALE + CANVAS_CENTER.1) as f32,
    )
}

/// Compose the top-down scene from every posed session.
///
/// Camera dots and axes go through the camera-to-world transform; detection
/// dots are plotted directly from their first two coordinates at
/// [`WORLD_SCALE`] around the canvas centre, without re-projection.
pub fn compose_scene(registry: &SessionRegistry) -> FusedScene {
    let mut scene = FusedScene::default();

    for session in registry.sessions() {
        let friendly_id = session.friendly_id();
        let color = palette_color(friendly_id);

        let anchored = matches!(registry.anchor(), WorldAnchor::Camera(id) if id == friendly_id);
        let pose = session.calibrator().pose();
        if pose.is_none() && !anchored {
            scene.skipped_sessions += 1;
            continue;
        }

        // An anchor camera without a solved pose sits at the world origin by
        // definition.
        let cam_to_world = pose
            .map(|p| *p.cam_to_world())
            .unwrap_or_else(camrig_core::Iso3::identity);

        let position = cam_to_world.transform_point(&Pt3::origin());
        // Short probe points along the camera-local forward (+Z) and lateral
        // (+X) axes give the orientation lines their endpoints.
        let forward = cam_to_world.transform_point(&Pt3::new(0.0, 0.0, 0.6));
        let lateral = cam_to_world.transform_point(&Pt3::new(0.3, 0.0, 0.0));

        scene.cameras.push(CameraGlyph {
            friendly_id,
            position: to_canvas(position.x, position.y),
            forward: to_canvas(forward.x, forward.y),
            lateral: to_canvas(lateral.x, lateral.y),
            color,
        });

        for object in session.detected_objects() {
            scene.detections.push(DetectionDot {
                friendly_id,
                position: to_canvas(object.point.x, object.point.y),
                color,
            });
        }
    }

    scene
}

/// Rasterise the scene: world axes at the centre (red +X, green +Y), one
/// dot plus two axis lines per camera, one larger dot per detection.
pub fn render_scene(scene: &FusedScene) -> RgbImage {
    let mut canvas = RgbImage::new(CANVAS_SIZE, CANVAS_SIZE);

    let center = (CANVAS_CENTER.0 as f32, CANVAS_CENTER.1 as f32);
    draw_line_segment_mut(
        &mut canvas,
        center,
        (center.0 + 30.0, center.1),
        Rgb([255, 0, 0]),
    );
    draw_line_segment_mut(
        &mut canvas,
        center,
        (center.0, center.1 + 30.0),
        Rgb([0, 255, 0]),
    );

    for camera in &scene.cameras {
        draw_line_segment_mut(&mut canvas, camera.position, camera.forward, camera.color);
        draw_line_segment_mut(&mut canvas, camera.position, camera.lateral, camera.color);
        draw_filled_circle_mut(
            &mut canvas,
            (camera.position.0 as i32, camera.position.1 as i32),
            5,
            camera.color,
        );
    }

    for dot in &scene.detections {
        draw_filled_circle_mut(
            &mut canvas,
            (dot.position.0 as i32, dot.position.1 as i32),
            10,
            dot.color,
        );
    }

    canvas
}

/// Compute the comparison-overlay markers for the selected camera.
///
/// Projects the world origin and every other posed camera's world position
/// through the selected camera's full camera model. Returns `None` when the
/// selected camera has no pose (there is nothing to project into).
pub fn comparison_markers(registry: &SessionRegistry, selected_id: u32) -> Option<ComparisonOverlay> {
    let selected = registry.session(selected_id)?;
    let camera = *selected.calibrator().camera()?;
    let pose = *selected.calibrator().pose()?;

    let project_one = |point: &Pt3| -> Option<Pt2> {
        project_points(
            std::slice::from_ref(point),
            &pose.rvec(),
            &pose.tvec(),
            &camera.intrinsics,
            &camera.distortion,
        )
        .into_iter()
        .next()
    };

    let origin_marker = project_one(&Pt3::origin());

    let mut camera_markers = Vec::new();
    for other in registry.sessions() {
        if other.friendly_id() == selected_id {
            continue;
        }
        let Some(other_pose) = other.calibrator().pose() else {
            continue;
        };
        if let Some(marker) = project_one(&other_pose.position()) {
            camera_markers.push((other.friendly_id(), marker));
        }
    }

    Some(ComparisonOverlay {
        origin_marker,
        camera_markers,
    })
}

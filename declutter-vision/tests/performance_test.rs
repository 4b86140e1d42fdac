//! Performance tests for per-frame mask work at camera resolution

use declutter_vision::mask::{self, Mask};
use declutter_vision::models::{Detection, Segmentation};
use declutter_vision::processing::{
    Compositor, CompositorSettings, DilationRadii, MaskComposer, MaskTracker, TrackerSettings,
};
use image::{Rgb, RgbImage};
use ndarray::Array2;

const H: usize = 256;
const W: usize = 256;

fn disk(cy: f32, cx: f32, radius: f32) -> Mask {
    Array2::from_shape_fn((H, W), |(r, c)| {
        let (dy, dx) = (r as f32 - cy, c as f32 - cx);
        if dy * dy + dx * dx <= radius * radius {
            1.0
        } else {
            0.0
        }
    })
}

#[test]
fn test_compose_and_composite_full_frame() {
    let safe = mask::union(&disk(60.0, 60.0, 25.0), &disk(60.0, 180.0, 35.0));
    let distractor = mask::union(&disk(190.0, 70.0, 30.0), &disk(200.0, 190.0, 20.0));
    let robot = disk(10.0, 128.0, 30.0);
    let live = RgbImage::from_pixel(W as u32, H as u32, Rgb([90, 90, 90]));
    let plate = RgbImage::from_pixel(W as u32, H as u32, Rgb([30, 160, 30]));

    let start = std::time::Instant::now();
    let composed = MaskComposer::compute(&safe, &distractor, DilationRadii { distractor: 10, safe: 5 });
    let compositor = Compositor::new(
        &composed,
        &safe,
        CompositorSettings {
            blend_sigma: 3.0,
            reinforcement_radius: 19,
            robot_dilation: 10,
        },
    );
    for _ in 0..10 {
        let frame = compositor.composite(&live, &plate, &robot).unwrap();
        assert_eq!(frame.image.dimensions(), (W as u32, H as u32));
    }
    let elapsed = start.elapsed();

    // Should complete in reasonable time (< 5 seconds)
    assert!(elapsed.as_secs() < 5, "took {:?}", elapsed);
}

#[test]
fn test_warmup_and_cleanup_full_frame() {
    let mut tracker = MaskTracker::new(H, W, "spoon", Some("towel".to_string()), TrackerSettings::default());
    let start = std::time::Instant::now();
    for frame in 0..20u32 {
        let jitter = (frame % 3) as f32;
        let safe = Segmentation::from_instances(
            H,
            W,
            vec![
                Detection::new("spoon_0", disk(60.0 + jitter, 60.0, 25.0), 0.8),
                Detection::new("spoon_1", disk(200.0, 60.0, 10.0), 0.4),
                Detection::new("towel", disk(60.0, 180.0, 35.0), 0.7),
            ],
        );
        let distractor = Segmentation::from_instances(
            H,
            W,
            vec![Detection::new("spatula", disk(200.0, 60.0, 12.0), 0.9)],
        );
        tracker.observe_warmup(frame, Some(&safe), Some(&distractor), None).unwrap();
    }
    let report = tracker.finalize();
    let elapsed = start.elapsed();

    assert_eq!(report.kept, Some(0));
    assert!(elapsed.as_secs() < 5, "took {:?}", elapsed);
}

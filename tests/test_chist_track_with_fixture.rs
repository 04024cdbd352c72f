use chisttrack_rs::{
    ChistTracker, Detection, PixelBuffer, Rect, TrackerConfig, TrackletStatus,
};
use serde::Deserialize;
use serde_json;

const FIXTURE_JSON_PATH: &str = "tests/data/two_objects_with_gap.json";

/*----------------------------------------------------------------------------
Json schema for the scenario fixture
----------------------------------------------------------------------------*/
#[derive(Debug, Deserialize)]
struct ScenarioJson {
    name: String,
    delta_t: f32,
    frame_width: usize,
    frame_height: usize,
    config: TrackerConfig,
    frames: Vec<FrameJson>,
}

#[derive(Debug, Deserialize)]
struct FrameJson {
    detections: Vec<DetectionJson>,
    expected: Vec<ExpectedJson>,
    num_tracklets: usize,
}

#[derive(Debug, Deserialize)]
struct DetectionJson {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    label: i32,
    index: i32,
}

#[derive(Debug, Deserialize)]
struct ExpectedJson {
    index: i32,
    id: u64,
    status: TrackletStatus,
}

impl From<&DetectionJson> for Detection {
    fn from(d: &DetectionJson) -> Self {
        Detection::new(Rect::new(d.x, d.y, d.width, d.height), d.label, d.index)
    }
}

fn read_scenario_json(path: &str) -> ScenarioJson {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(path);
    let file = std::fs::File::open(path).unwrap();
    serde_json::from_reader(file).unwrap()
}

/*----------------------------------------------------------------------------
Test
----------------------------------------------------------------------------*/
#[test]
fn test_chist_track_with_fixture() {
    let scenario = read_scenario_json(FIXTURE_JSON_PATH);
    let frame = PixelBuffer::new(
        scenario.frame_width,
        scenario.frame_height,
        scenario.config.input_color_format,
    )
    .unwrap();
    let mut tracker = ChistTracker::new(scenario.config.clone()).unwrap();

    for (frame_id, frame_json) in scenario.frames.iter().enumerate() {
        let detections = frame_json
            .detections
            .iter()
            .map(Detection::from)
            .collect::<Vec<_>>();
        let tracklets = tracker
            .track_objects(&frame, &detections, scenario.delta_t)
            .unwrap();

        assert_eq!(
            tracklets.len(),
            frame_json.num_tracklets,
            "{}: frame {}",
            scenario.name,
            frame_id
        );
        for expected in frame_json.expected.iter() {
            let tracklet = tracklets
                .iter()
                .find(|t| t.association_idx() == Some(expected.index))
                .unwrap_or_else(|| {
                    panic!(
                        "{}: frame {}: detection {} is not associated",
                        scenario.name, frame_id, expected.index
                    )
                });
            assert_eq!(
                tracklet.id(),
                expected.id,
                "{}: frame {}",
                scenario.name,
                frame_id
            );
            assert_eq!(
                tracklet.status(),
                expected.status,
                "{}: frame {}",
                scenario.name,
                frame_id
            );
        }
    }
}

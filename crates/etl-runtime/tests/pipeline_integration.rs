use std::io::Write;
use std::path::Path;

use etl_core::settings::{RecordLimit, Settings};
use etl_core::table::Frame;
use etl_data::source::open_source;
use etl_runtime::pipeline::Pipeline;
use tempfile::TempDir;

const SAMPLES: &[&str] = &[
    r#"{"gnss": {"time": "2018-07-28T10:00:00Z", "lat": 37.1, "latitude": 0.0, "lon": -122.0, "speed_mps": 10.0, "fix": 3, "num_sats": 8}, "can": {"time": "2018-07-28T10:00:00Z", "vehicle_speed_kph": 10}}"#,
    r#"{"IMU": {"time": "2018-07-28T10:00:01Z", "ax": 2.0}, "CAN": {"timestamp": "2018-07-28T10:00:01Z", "speed_kph": 20}}"#,
    r#"{"imu": {"time": "2018-07-28T10:00:02Z", "ax": -2.0}, "gnss": {"time": "2018-07-28T10:00:02Z", "num_sats": 10, "fix": 2}}"#,
    r#"{"can": {"time": "2018-07-29T08:00:00Z", "vehicle_speed_kph": 30}, "pose": {"x": 1.0, "yaw": 0.1}}"#,
    r#"{"imu": {"time": "2018-07-29T08:00:01Z", "ax": "bad"}, "camera": "frame_0001.jpg"}"#,
    r#"{"pose": {"note": "nothing usable"}}"#,
];

fn write_dataset(root: &Path) {
    std::fs::create_dir_all(root).unwrap();
    let mut file = std::fs::File::create(root.join("train.jsonl")).unwrap();
    for line in SAMPLES {
        writeln!(file, "{}", line).unwrap();
    }
}

fn settings_for(tmp: &TempDir) -> Settings {
    let dataset = tmp.path().join("comma2k19");
    write_dataset(&dataset);
    let mut settings = Settings::default().rooted_at(tmp.path());
    settings.dataset = dataset.to_string_lossy().to_string();
    settings.limit = RecordLimit::UNBOUNDED;
    settings
}

#[test]
fn test_all_stages_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let settings = settings_for(&tmp);
    let source = open_source(&settings).unwrap();

    let report = Pipeline::new(&settings).run_all(source.as_ref(), |_| {}).unwrap();

    // RAW
    assert_eq!(report.extract.records, SAMPLES.len() as u64);
    let raw = std::fs::read_to_string(&settings.raw_path).unwrap();
    assert_eq!(raw.lines().count(), SAMPLES.len());

    // SILVER
    let gnss = Frame::read_csv(&settings.silver_dir.join("gnss.csv")).unwrap();
    assert_eq!(gnss.len(), 2);
    assert_eq!(gnss.column("lat").unwrap()[0], "37.1");
    assert_eq!(gnss.column("speed_kph").unwrap()[0], "36.0");
    assert_eq!(gnss.column("time").unwrap()[0], "2018-07-28T10:00:00+00:00");

    let can = Frame::read_csv(&settings.silver_dir.join("can.csv")).unwrap();
    assert_eq!(can.len(), 3);

    let pose = Frame::read_csv(&settings.silver_dir.join("pose.csv")).unwrap();
    assert_eq!(pose.len(), 1);
    assert_eq!(report.transform.stats.records, SAMPLES.len() as u64);

    // GOLD
    let speed = std::fs::read_to_string(settings.gold_dir.join("vw_speed_summary.csv")).unwrap();
    assert_eq!(
        speed.lines().collect::<Vec<_>>(),
        vec![
            "ts_date,avg_speed_kph,max_speed_kph",
            "2018-07-28,15.0,20.0",
            "2018-07-29,30.0,30.0",
        ]
    );

    let quality = std::fs::read_to_string(settings.gold_dir.join("vw_gnss_quality.csv")).unwrap();
    assert_eq!(
        quality.lines().collect::<Vec<_>>(),
        vec!["ts_date,avg_sats,pct_3d_fix", "2018-07-28,9.0,0.5"]
    );

    let accel = std::fs::read_to_string(settings.gold_dir.join("vw_accel_events.csv")).unwrap();
    assert_eq!(
        accel.lines().collect::<Vec<_>>(),
        vec![
            "ts_date,hard_accel_events,hard_brake_events",
            "2018-07-28,1,1",
            "2018-07-29,0,0",
        ]
    );
}

#[test]
fn test_stages_rerun_independently() {
    let tmp = TempDir::new().unwrap();
    let mut settings = settings_for(&tmp);
    settings.limit = RecordLimit(Some(1));
    let source = open_source(&settings).unwrap();
    let pipeline = Pipeline::new(&settings);

    pipeline.extract(source.as_ref(), |_| {}).unwrap();
    let first = pipeline.transform().unwrap();
    assert_eq!(first.stats.records, 1);

    // Rerunning transform from the same RAW file gives the same SILVER output.
    let gnss_before = std::fs::read_to_string(&first.silver[&etl_core::models::Modality::Gnss]).unwrap();
    let second = pipeline.transform().unwrap();
    let gnss_after = std::fs::read_to_string(&second.silver[&etl_core::models::Modality::Gnss]).unwrap();
    assert_eq!(gnss_before, gnss_after);

    let metrics = pipeline.metrics().unwrap();
    assert_eq!(metrics.days["vw_speed_summary"], 1);
}

#[test]
fn test_transform_stops_on_malformed_raw() {
    let tmp = TempDir::new().unwrap();
    let settings = Settings::default().rooted_at(tmp.path());
    std::fs::create_dir_all(settings.raw_path.parent().unwrap()).unwrap();
    std::fs::write(&settings.raw_path, "{\"gnss\": {\"lat\": 1.0}}\n{broken\n").unwrap();

    let err = Pipeline::new(&settings).transform().unwrap_err();
    assert!(err.to_string().contains(":2:"));
    assert!(!settings.silver_dir.join("gnss.csv").exists());
}

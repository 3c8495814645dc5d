mod common;

use common::*;
use face_blur::core::processor::FrameReport;
use face_blur::core::whitelist::WhitelistEntry;
use face_blur::pipeline::process_frames;
use face_blur::{
    BlurSettings, DistanceMetric, FaceBlurError, FaceBlurProcessor, JobControl, ProgressObserver, Result, Whitelist,
};
use image::RgbImage;
use std::path::Path;
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    progress: Vec<(Option<u8>, String)>,
    logs: Vec<String>,
    frames: usize,
    stop_after: Option<(usize, JobControl)>,
}

impl ProgressObserver for Recorder {
    fn on_progress(&mut self, percent: Option<u8>, status: &str) {
        self.progress.push((percent, status.to_string()));
        if let Some((n, control)) = &self.stop_after {
            if self.progress.len() == *n {
                control.stop();
            }
        }
    }

    fn on_log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn on_frame(&mut self, _frame: &RgbImage, _report: &FrameReport) {
        self.frames += 1;
    }
}

fn processor(detector: FakeDetector) -> FaceBlurProcessor<FakeDetector, MeanColorEmbedder> {
    let whitelist = Whitelist::from_entries(
        vec![WhitelistEntry { name: "red.png".into(), embedding: red_embedding() }],
        DistanceMetric::Euclidean,
        0.5,
    );
    FaceBlurProcessor::new(
        detector,
        MeanColorEmbedder::default(),
        whitelist,
        BlurSettings { kernel_size: 15, sigma: 5.0 },
        0.5,
    )
}

fn frames(n: usize) -> Vec<Result<RgbImage>> {
    (0..n).map(|_| Ok(two_face_frame())).collect()
}

#[test]
fn every_frame_is_written_with_progress() {
    let processor = processor(FakeDetector::new(vec![left_face(), right_face()]));
    let mut sink: Vec<RgbImage> = Vec::new();
    let mut recorder = Recorder::default();

    let summary =
        process_frames(&processor, frames(5), 5, &mut sink, &JobControl::new(), &mut recorder).unwrap();

    assert_eq!(sink.len(), 5);
    assert_eq!(summary.frames_processed, 5);
    assert!(!summary.stopped);
    assert_eq!(summary.faces.detected, 10);
    assert_eq!(summary.faces.blurred, 5);
    assert_eq!(summary.faces.whitelisted, 5);
    assert_eq!(recorder.frames, 5);

    let percents: Vec<Option<u8>> = recorder.progress.iter().map(|(p, _)| *p).collect();
    assert_eq!(percents, [Some(20), Some(40), Some(60), Some(80), Some(100)]);
    assert!(recorder.progress[4].1.starts_with("Processing: 5/5 | FPS: "));

    // Right half blurred, left half kept
    assert_ne!(sink[0], two_face_frame());
}

#[test]
fn unknown_total_reports_no_percentage() {
    let processor = processor(FakeDetector::new(vec![]));
    let mut sink: Vec<RgbImage> = Vec::new();
    let mut recorder = Recorder::default();

    process_frames(&processor, frames(3), 0, &mut sink, &JobControl::new(), &mut recorder).unwrap();

    assert!(recorder.progress.iter().all(|(p, _)| p.is_none()));
    assert!(recorder.progress[2].1.starts_with("Processing: 3 | FPS: "));
}

#[test]
fn empty_whitelist_is_refused() {
    let detector = FakeDetector::new(vec![left_face()]);
    let processor = FaceBlurProcessor::new(
        detector,
        MeanColorEmbedder::default(),
        Whitelist::new(DistanceMetric::Euclidean, 0.5),
        BlurSettings { kernel_size: 15, sigma: 5.0 },
        0.5,
    );
    let mut sink: Vec<RgbImage> = Vec::new();
    let mut recorder = Recorder::default();

    let err = process_frames(&processor, frames(2), 2, &mut sink, &JobControl::new(), &mut recorder).unwrap_err();

    assert!(matches!(err, FaceBlurError::EmptyWhitelist));
    assert!(sink.is_empty());
    assert_eq!(recorder.logs, ["Whitelist is empty. Add faces to the whitelist first."]);
    assert_eq!(processor.detector().calls(), 0);
}

#[test]
fn empty_whitelist_is_refused_before_opening_the_video() {
    let processor = FaceBlurProcessor::new(
        FakeDetector::new(vec![]),
        MeanColorEmbedder::default(),
        Whitelist::new(DistanceMetric::Euclidean, 0.5),
        BlurSettings { kernel_size: 15, sigma: 5.0 },
        0.5,
    );
    let mut recorder = Recorder::default();

    let err = face_blur::process_video(
        Path::new("/nonexistent/input.mp4"),
        Path::new("/nonexistent/output.mp4"),
        &processor,
        &JobControl::new(),
        &mut recorder,
    )
    .unwrap_err();
    assert!(matches!(err, FaceBlurError::EmptyWhitelist));
}

#[test]
fn failing_frame_is_written_unmodified() {
    let processor = processor(FakeDetector::failing_on(vec![left_face(), right_face()], 1));
    let mut sink: Vec<RgbImage> = Vec::new();
    let mut recorder = Recorder::default();

    let summary =
        process_frames(&processor, frames(3), 3, &mut sink, &JobControl::new(), &mut recorder).unwrap();

    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.frame_errors, 1);
    assert_eq!(sink[1], two_face_frame());
    assert_ne!(sink[0], two_face_frame());
    assert_ne!(sink[2], two_face_frame());
    assert!(recorder.logs.iter().any(|l| l.starts_with("Error on frame 1:")));
    assert_eq!(recorder.progress.len(), 3);
}

#[test]
fn source_error_aborts_the_job() {
    let processor = processor(FakeDetector::new(vec![]));
    let mut sink: Vec<RgbImage> = Vec::new();
    let input: Vec<Result<RgbImage>> =
        vec![Ok(two_face_frame()), Err(FaceBlurError::Video("Truncated frame 1 from decoder".into()))];

    let result = process_frames(&processor, input, 2, &mut sink, &JobControl::new(), &mut Recorder::default());

    assert!(matches!(result, Err(FaceBlurError::Video(_))));
    assert_eq!(sink.len(), 1);
}

#[test]
fn stop_ends_after_the_current_frame() {
    let processor = processor(FakeDetector::new(vec![]));
    let control = JobControl::new();
    let mut sink: Vec<RgbImage> = Vec::new();
    let mut recorder = Recorder { stop_after: Some((2, control.clone())), ..Default::default() };

    let summary = process_frames(&processor, frames(10), 10, &mut sink, &control, &mut recorder).unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.frames_processed, 2);
    assert_eq!(sink.len(), 2);
}

#[test]
fn paused_job_resumes() {
    let processor = processor(FakeDetector::new(vec![]));
    let control = JobControl::new();
    control.pause();

    let remote = control.clone();
    let resumer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        remote.resume();
    });

    let mut sink: Vec<RgbImage> = Vec::new();
    let summary = process_frames(&processor, frames(3), 3, &mut sink, &control, &mut Recorder::default()).unwrap();
    resumer.join().unwrap();

    assert!(!summary.stopped);
    assert_eq!(sink.len(), 3);
    assert!(summary.elapsed >= Duration::from_millis(100));
}

#[test]
fn tracing_observer_drives_a_headless_job() {
    let processor = processor(FakeDetector::new(vec![left_face()]));
    let mut sink: Vec<RgbImage> = Vec::new();
    let mut observer = face_blur::pipeline::TracingObserver::default();

    let summary = process_frames(&processor, frames(4), 4, &mut sink, &JobControl::new(), &mut observer).unwrap();

    assert_eq!(summary.frames_processed, 4);
    assert_eq!(summary.faces.whitelisted, 4);
    assert_eq!(sink, frames(4).into_iter().map(|f| f.unwrap()).collect::<Vec<_>>());
}

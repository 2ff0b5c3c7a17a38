// THEORY:
// Frames of an operative video are independent: no frame's assessment reads another's.
// The `parallel_pipeline` exploits that with a fixed pool of workers, then puts the
// results back in frame order to build a per-second timeline.
//
// Key architectural principles:
// 1.  **Dispatcher + Workers**: One dispatcher task deals frames round-robin to per-worker
//     channels. Each task carries a oneshot sender for its own result.
// 2.  **Blocking Work Off The Runtime**: Pixel loops run inside `spawn_blocking`, so the
//     async workers only shuttle frames and results.
// 3.  **Reorder Buffer**: Results arrive in completion order. They are parked in a
//     pending map keyed by frame id and released strictly in sequence, so "the last
//     frame of a second" means the same thing however the pool scheduled them.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use image::RgbImage;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::core_modules::severity::AlertLevel;
use crate::error::{Result, TriageError};
use crate::pipeline::{FrameReport, TriagePipeline};

pub struct FrameBuffer {
    pub frame: RgbImage,
    pub frame_id: u64,
}

pub struct FrameTask {
    pub frame_buffer: FrameBuffer,
    pub result_sender: oneshot::Sender<Result<FrameReport>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<FrameTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Must be called from inside a tokio runtime.
    pub fn new(pipeline: TriagePipeline) -> Self {
        let worker_count = pipeline.config().worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<FrameTask>();
        let mut workers = Vec::with_capacity(worker_count);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) =
            (0..worker_count).map(|_| mpsc::unbounded_channel::<FrameTask>()).unzip();

        // Dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if worker_senders[worker_idx].send(task).is_err() {
                    warn!("worker {worker_idx} is gone; frame dropped");
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        for mut worker_receiver in worker_receivers {
            let worker_pipeline = pipeline.clone();
            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let analysis = Self::process_frame_worker(worker_pipeline.clone(), task.frame_buffer).await;
                    let _ = task.result_sender.send(analysis);
                }
            });
            workers.push(worker);
        }

        Self { task_sender, workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    async fn process_frame_worker(pipeline: TriagePipeline, frame_buffer: FrameBuffer) -> Result<FrameReport> {
        let frame_id = frame_buffer.frame_id;
        let report = tokio::task::spawn_blocking(move || pipeline.analyze_frame(&frame_buffer.frame))
            .await
            .map_err(|_| TriageError::WorkerPool("frame analysis panicked"))??;
        debug!("frame {frame_id}: {} ({})", report.status, report.message);
        Ok(report)
    }

    pub async fn process_frame(&self, frame_buffer: FrameBuffer) -> Result<FrameReport> {
        let (result_sender, result_receiver) = oneshot::channel();

        self.task_sender
            .send(FrameTask { frame_buffer, result_sender })
            .map_err(|_| TriageError::WorkerPool("failed to send task to worker pool"))?;

        result_receiver
            .await
            .map_err(|_| TriageError::WorkerPool("failed to receive result from worker"))?
    }
}

/// One second of a video, represented by its last analysed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub second: u64,
    pub frame_index: u64,
    #[serde(flatten)]
    pub report: FrameReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TimelineSummary {
    pub critical_seconds: usize,
    pub warning_seconds: usize,
    pub stable_seconds: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoTimeline {
    pub fps: f64,
    pub frame_skip: usize,
    pub processed_frames: usize,
    pub total_seconds: usize,
    pub timeline: Vec<TimelineEntry>,
    pub summary: TimelineSummary,
}

/// Frames between two analysed frames when sampling `source_fps` down to `target_fps`.
pub fn frame_skip(source_fps: f64, target_fps: u32) -> usize {
    if target_fps == 0 {
        return 1;
    }
    ((source_fps / target_fps as f64) as usize).max(1)
}

pub fn summarize(timeline: &[TimelineEntry]) -> TimelineSummary {
    let critical_seconds = timeline.iter().filter(|e| e.report.level == AlertLevel::Red).count();
    let warning_seconds = timeline.iter().filter(|e| e.report.level == AlertLevel::Orange).count();
    TimelineSummary {
        critical_seconds,
        warning_seconds,
        stable_seconds: timeline.len() - critical_seconds - warning_seconds,
    }
}

pub struct ParallelPipeline {
    pipeline: TriagePipeline,
    worker_pool: WorkerPool,
    frame_counter: AtomicU64,
}

impl ParallelPipeline {
    pub fn new(pipeline: TriagePipeline) -> Self {
        let worker_pool = WorkerPool::new(pipeline.clone());
        Self { pipeline, worker_pool, frame_counter: AtomicU64::new(0) }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    /// Analyses one frame on the pool. Returns the pool-wide frame id with the report.
    pub async fn process_frame(&self, frame: RgbImage) -> Result<(u64, FrameReport)> {
        let frame_id = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let frame_buffer = FrameBuffer { frame, frame_id };
        let report = self.worker_pool.process_frame(frame_buffer).await?;
        Ok((frame_id, report))
    }

    /// Samples decoded frames at the configured rate, analyses them in parallel and
    /// folds the ordered results into one entry per second.
    pub async fn analyze_video(&self, frames: Vec<RgbImage>, source_fps: f64) -> Result<VideoTimeline> {
        let target_fps = self.pipeline.config().target_fps;
        let fps = if source_fps.is_finite() && source_fps > 0.0 {
            source_fps
        } else {
            warn!("invalid source fps {source_fps}; assuming {target_fps}");
            target_fps.max(1) as f64
        };
        let skip = frame_skip(fps, target_fps);
        let started = Instant::now();

        let mut in_flight: FuturesUnordered<_> = frames
            .into_iter()
            .enumerate()
            .filter(|(index, _)| index % skip == 0)
            .map(|(index, frame)| async move {
                let (_, report) = self.process_frame(frame).await?;
                Ok::<_, TriageError>((index as u64, report))
            })
            .collect();

        // Results complete out of order; release them by frame index.
        let mut pending: HashMap<u64, FrameReport> = HashMap::new();
        while let Some(result) = in_flight.next().await {
            let (index, report) = result?;
            pending.insert(index, report);
        }
        let processed_frames = pending.len();
        let mut order: Vec<u64> = pending.keys().copied().collect();
        order.sort_unstable();

        let mut seconds: BTreeMap<u64, TimelineEntry> = BTreeMap::new();
        for frame_index in order {
            let Some(report) = pending.remove(&frame_index) else {
                continue;
            };
            let second = (frame_index as f64 / fps) as u64;
            seconds.insert(second, TimelineEntry { second, frame_index, report });
        }

        let timeline: Vec<TimelineEntry> = seconds.into_values().collect();
        let summary = summarize(&timeline);
        info!(
            "video: {processed_frames} frames in {:.2?}, {} s critical, {} s warning",
            started.elapsed(),
            summary.critical_seconds,
            summary.warning_seconds
        );

        Ok(VideoTimeline {
            fps,
            frame_skip: skip,
            processed_frames,
            total_seconds: timeline.len(),
            timeline,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriageConfig;
    use image::Rgb;

    fn pipeline(worker_count: usize, target_fps: u32) -> TriagePipeline {
        TriagePipeline::new(TriageConfig { worker_count, target_fps, ..TriageConfig::default() })
    }

    fn blood() -> RgbImage {
        RgbImage::from_pixel(20, 20, Rgb([200, 30, 30]))
    }

    fn haze() -> RgbImage {
        RgbImage::from_pixel(20, 20, Rgb([120, 120, 120]))
    }

    fn sharp_empty() -> RgbImage {
        RgbImage::from_fn(20, 20, |x, y| if (x + y) % 2 == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) })
    }

    #[test]
    fn frame_skip_never_drops_below_one() {
        assert_eq!(frame_skip(30.0, 10), 3);
        assert_eq!(frame_skip(25.0, 10), 2);
        assert_eq!(frame_skip(5.0, 10), 1);
        assert_eq!(frame_skip(30.0, 0), 1);
    }

    #[tokio::test]
    async fn pool_assigns_sequential_frame_ids() {
        let parallel = ParallelPipeline::new(pipeline(3, 10));
        assert_eq!(parallel.worker_count(), 3);
        let (first, report) = parallel.process_frame(blood()).await.expect("analysed");
        let (second, _) = parallel.process_frame(haze()).await.expect("analysed");
        assert_eq!((first, second), (0, 1));
        assert_eq!(report.status, "CRITICAL");
    }

    #[tokio::test]
    async fn timeline_has_one_entry_per_second() {
        let parallel = ParallelPipeline::new(pipeline(4, 5));
        let frames: Vec<RgbImage> = (0..25)
            .map(|i| match i {
                0..=9 => blood(),
                10..=19 => haze(),
                _ => sharp_empty(),
            })
            .collect();

        let video = parallel.analyze_video(frames, 10.0).await.expect("analysed");
        assert_eq!(video.frame_skip, 2);
        assert_eq!(video.processed_frames, 13);
        assert_eq!(video.total_seconds, 3);
        let statuses: Vec<&str> = video.timeline.iter().map(|e| e.report.status.as_str()).collect();
        assert_eq!(statuses, ["CRITICAL", "WARNING", "INACTIVE"]);
        assert_eq!(video.timeline[0].frame_index, 8);
        assert_eq!(video.summary, TimelineSummary { critical_seconds: 1, warning_seconds: 1, stable_seconds: 1 });
    }

    #[tokio::test]
    async fn last_frame_of_a_second_wins() {
        let parallel = ParallelPipeline::new(pipeline(2, 2));
        let video = parallel.analyze_video(vec![blood(), haze()], 2.0).await.expect("analysed");
        assert_eq!(video.timeline.len(), 1);
        assert_eq!(video.timeline[0].report.status, "WARNING");
        assert_eq!(video.timeline[0].frame_index, 1);
    }

    #[tokio::test]
    async fn empty_video_has_an_empty_timeline() {
        let parallel = ParallelPipeline::new(pipeline(1, 10));
        let video = parallel.analyze_video(Vec::new(), 0.0).await.expect("analysed");
        assert_eq!(video.processed_frames, 0);
        assert_eq!(video.summary, TimelineSummary::default());
    }

    #[test]
    fn timeline_serialises_flat() {
        let entry = TimelineEntry {
            second: 3,
            frame_index: 90,
            report: FrameReport {
                status: "STABLE".to_string(),
                message: "Operation in progress".to_string(),
                level: AlertLevel::Green,
                tools: 1,
                hands: 1,
                blood_pct: 1.2,
                sharpness: 430.0,
                detections: Vec::new(),
            },
        };
        let json = serde_json::to_value(&entry).expect("serialise");
        assert_eq!(json["second"], 3);
        assert_eq!(json["level"], "green");
        assert_eq!(json["blood_pct"], 1.2);
    }
}

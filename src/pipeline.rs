//! Threaded stage runner
//!
//! Runs a configured [`ScaleFilter`] on its own thread, fed and drained
//! through bounded channels. Closing the input is end of stream; the
//! stage then closes its output. A frame the converter rejects is dropped
//! and counted; any other error stops the stage.

use crate::error::{Error, Result};
use crate::filter::ScaleFilter;
use crate::frame::Frame;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Per-stage counters
#[derive(Debug, Clone, Default)]
pub struct StageStats {
    /// Frames received from upstream
    pub frames_in: u64,
    /// Frames forwarded downstream
    pub frames_out: u64,
    /// Frames that failed to convert
    pub frames_failed: u64,
    /// Average time spent in the filter per frame, in ms
    pub avg_latency_ms: f64,
}

/// Handle to a running stage
pub struct StageHandle {
    input: Option<Sender<Frame>>,
    output: Receiver<Frame>,
    stats: Arc<Mutex<StageStats>>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl StageHandle {
    /// Move `filter` onto a new thread. `capacity` bounds both queues.
    pub fn spawn(filter: ScaleFilter, capacity: usize) -> Result<Self> {
        if filter.output().is_none() {
            return Err(Error::NotConfigured);
        }

        let (input_tx, input_rx) = crossbeam_channel::bounded::<Frame>(capacity);
        let (output_tx, output_rx) = crossbeam_channel::bounded::<Frame>(capacity);
        let stats = Arc::new(Mutex::new(StageStats::default()));

        let thread_stats = stats.clone();
        let thread = std::thread::Builder::new()
            .name("ghostscale-stage".into())
            .spawn(move || run_stage(filter, input_rx, output_tx, thread_stats))?;

        tracing::info!("Scale stage started (queue depth {})", capacity);

        Ok(Self {
            input: Some(input_tx),
            output: output_rx,
            stats,
            thread: Some(thread),
        })
    }

    /// Queue a frame, blocking while the stage is busy
    pub fn send(&self, frame: Frame) -> Result<()> {
        let tx = self.input.as_ref().ok_or(Error::StageClosed)?;
        tx.send(frame).map_err(|_| Error::StageClosed)
    }

    /// Next output frame; `None` at end of stream
    pub fn recv(&self) -> Option<Frame> {
        self.output.recv().ok()
    }

    /// Next output frame, waiting at most `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Frame>> {
        match self.output.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::StageClosed),
        }
    }

    /// Signal end of stream
    pub fn finish(&mut self) {
        self.input.take();
    }

    pub fn stats(&self) -> StageStats {
        self.stats.lock().clone()
    }

    /// End the stream, drop undelivered output and wait for the stage thread.
    /// Returns the final counters or the error that stopped the stage.
    pub fn join(mut self) -> Result<StageStats> {
        self.finish();
        for _ in self.output.iter() {}
        let result = match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::Internal("Scale stage thread panicked".into()))?,
            None => Ok(()),
        };
        result.map(|_| self.stats())
    }
}

impl Drop for StageHandle {
    fn drop(&mut self) {
        self.input.take();
        if let Some(thread) = self.thread.take() {
            for _ in self.output.iter() {}
            let _ = thread.join();
        }
    }
}

fn run_stage(
    mut filter: ScaleFilter,
    input: Receiver<Frame>,
    output: Sender<Frame>,
    stats: Arc<Mutex<StageStats>>,
) -> Result<()> {
    let mut total_time = Duration::ZERO;

    for frame in input.iter() {
        stats.lock().frames_in += 1;
        let start = Instant::now();

        let out = match filter.filter_frame(frame) {
            Ok(out) => out,
            Err(e) if e.is_recoverable() => {
                stats.lock().frames_failed += 1;
                tracing::warn!("Dropped frame ({:?}): {}", e.status(), e);
                continue;
            }
            Err(e) => {
                stats.lock().frames_failed += 1;
                tracing::error!("Scale stage stopped: {}", e);
                return Err(e);
            }
        };

        total_time += start.elapsed();
        {
            let mut s = stats.lock();
            s.frames_out += 1;
            s.avg_latency_ms = total_time.as_secs_f64() * 1000.0 / s.frames_out as f64;
        }

        if output.send(out).is_err() {
            tracing::debug!("Downstream closed");
            break;
        }
    }

    filter.uninit();
    tracing::info!("Scale stage stopped after {} frames", stats.lock().frames_out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::software::SoftwareFactory;
    use crate::config::ScaleConfig;
    use crate::filter::InputLink;
    use crate::types::PixelFormat;

    fn configured(config: ScaleConfig, link: &InputLink, out: PixelFormat) -> ScaleFilter {
        let mut filter = ScaleFilter::init(config, Arc::new(SoftwareFactory::new())).unwrap();
        filter.config_output(link, out).unwrap();
        filter
    }

    #[test]
    fn test_requires_configured_filter() {
        let filter =
            ScaleFilter::init(ScaleConfig::default(), Arc::new(SoftwareFactory::new())).unwrap();
        assert!(matches!(StageHandle::spawn(filter, 2), Err(Error::NotConfigured)));
    }

    #[test]
    fn test_frames_flow_in_order() {
        let link = InputLink::host(PixelFormat::Nv12, 8, 8);
        let filter = configured(
            ScaleConfig::default().with_size("4", "4"),
            &link,
            PixelFormat::Nv12,
        );
        let mut stage = StageHandle::spawn(filter, 2).unwrap();

        let sender = std::thread::spawn({
            let tx = stage.input.clone().unwrap();
            move || {
                for pts in 0..5 {
                    let mut frame = Frame::new_host(PixelFormat::Nv12, 8, 8);
                    frame.pts = pts;
                    tx.send(frame).unwrap();
                }
            }
        });

        let mut seen = Vec::new();
        for _ in 0..5 {
            let frame = stage.recv().unwrap();
            assert_eq!((frame.width, frame.height), (4, 4));
            seen.push(frame.pts);
        }
        sender.join().unwrap();
        stage.finish();
        assert!(stage.recv().is_none());
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);

        let stats = stage.join().unwrap();
        assert_eq!(stats.frames_in, 5);
        assert_eq!(stats.frames_out, 5);
        assert_eq!(stats.frames_failed, 0);
    }

    #[test]
    fn test_rejected_frame_is_dropped() {
        let link = InputLink::host(PixelFormat::Nv12, 8, 8);
        let filter = configured(ScaleConfig::default(), &link, PixelFormat::Nv12);
        let mut stage = StageHandle::spawn(filter, 2).unwrap();

        // Wrong layout for the configured converter
        stage.send(Frame::new_host(PixelFormat::Bgra, 8, 8)).unwrap();
        let mut frame = Frame::new_host(PixelFormat::Nv12, 8, 8);
        frame.pts = 7;
        stage.send(frame).unwrap();
        stage.finish();

        assert_eq!(stage.recv().unwrap().pts, 7);
        assert!(stage.recv().is_none());
        let stats = stage.join().unwrap();
        assert_eq!(stats.frames_in, 2);
        assert_eq!(stats.frames_out, 1);
        assert_eq!(stats.frames_failed, 1);
    }

    #[test]
    fn test_failure_stops_stage() {
        let link = InputLink::host(PixelFormat::Nv12, 8, 8);
        let filter = configured(ScaleConfig::default(), &link, PixelFormat::Nv12);
        let stage = StageHandle::spawn(filter, 2).unwrap();

        // Host frame without plane data cannot be uploaded
        let mut frame = Frame::new_host(PixelFormat::Nv12, 8, 8);
        frame.planes.clear();
        stage.send(frame).unwrap();
        assert!(stage.recv().is_none());
        assert!(matches!(stage.join(), Err(Error::UnsupportedFormat(_))));
    }
}

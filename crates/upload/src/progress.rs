//! Transfer speed estimation.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 100;

/// Sliding-window speed calculator fed with byte deltas.
pub struct SpeedCalculator {
    inner: Mutex<Window>,
}

struct Window {
    samples: VecDeque<(Instant, u64)>,
    max_samples: usize,
    span: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// `span` defaults to 5 s, `max_samples` to 100 (minimum 2).
    pub fn new(span: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Window {
                samples: VecDeque::new(),
                max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
                span: span.unwrap_or(DEFAULT_WINDOW),
            }),
        }
    }

    /// Records `bytes` transferred since the previous sample.
    pub fn add_sample(&self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    fn add_sample_at(&self, bytes: u64, at: Instant) {
        let mut w = self.inner.lock().unwrap();
        w.samples.push_back((at, bytes));

        while let Some(&(oldest, _)) = w.samples.front() {
            if at.duration_since(oldest) > w.span {
                w.samples.pop_front();
            } else {
                break;
            }
        }
        while w.samples.len() > w.max_samples {
            w.samples.pop_front();
        }
    }

    /// Average bytes/second across the window; 0 with fewer than 2 samples.
    ///
    /// The oldest sample only marks the start of the window, its bytes were
    /// transferred before it.
    pub fn bytes_per_second(&self) -> f64 {
        let w = self.inner.lock().unwrap();
        let (Some(&(first, _)), Some(&(last, _))) = (w.samples.front(), w.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.duration_since(first);
        if w.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }
        let bytes: u64 = w.samples.iter().skip(1).map(|&(_, b)| b).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to move `remaining` bytes, `None` while speed is unknown.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        (speed > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / speed))
    }

    pub fn reset(&self) {
        self.inner.lock().unwrap().samples.clear();
    }
}

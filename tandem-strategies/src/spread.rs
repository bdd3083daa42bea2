//! Spread statistics
//!
//! Maintains the exponentially-weighted mean of the pair spread
//! `mid1 - ratio * mid2` and its rolling standard deviation over a
//! bounded window of recent samples, and turns the pair of mids into a
//! single standardised deviation.
//!
//! The mean is an EMA, never a simple moving average: the day-start
//! snapshot seeds it and `alpha` keeps it adapting. The deviation is
//! forced to zero until the sample window has filled once, and whenever
//! the standard deviation collapses below epsilon.

/// Below this, the spread is considered degenerate and deviation is 0.
const STD_DEV_EPSILON: f64 = 1e-10;

/// One tick's spread statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadReading {
    pub current: f64,
    pub avg_ori: f64,
    /// `avg_ori` plus the externally-driven t-var offset.
    pub avg: f64,
    pub std_dev: f64,
    pub deviation: f64,
    pub t_value: f64,
}

/// Rolling spread model for one pair
#[derive(Debug, Clone)]
pub struct SpreadAnalyzer {
    ratio: f64,
    alpha: f64,
    avg_ori: f64,
    seeded: bool,

    /// Circular buffer of recent spread samples.
    window: Vec<f64>,
    position: usize,
    count: usize,

    last: SpreadReading,
}

impl SpreadAnalyzer {
    pub fn new(ratio: f64, alpha: f64, window_len: usize) -> Self {
        let window_len = window_len.max(2);
        Self {
            ratio,
            alpha,
            avg_ori: 0.0,
            seeded: false,
            window: vec![0.0; window_len],
            position: 0,
            count: 0,
            last: SpreadReading::default(),
        }
    }

    /// Seed the mean from the day-start snapshot. A zero snapshot leaves
    /// the analyzer to seed itself from the first valid tick.
    pub fn seed_mean(&mut self, avg: f64) {
        if avg != 0.0 {
            self.avg_ori = avg;
            self.seeded = true;
        }
    }

    /// Swap model parameters (threshold reload). The mean estimate
    /// survives; the sample window restarts when its length changes.
    pub fn reconfigure(&mut self, ratio: f64, alpha: f64, window_len: usize) {
        let window_len = window_len.max(2);
        self.ratio = ratio;
        self.alpha = alpha;
        if window_len != self.window.len() {
            self.window = vec![0.0; window_len];
            self.position = 0;
            self.count = 0;
        }
    }

    #[inline(always)]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    #[inline(always)]
    pub fn avg_ori(&self) -> f64 {
        self.avg_ori
    }

    #[inline(always)]
    pub fn last(&self) -> SpreadReading {
        self.last
    }

    /// The deviation becomes meaningful once the window has filled.
    #[inline(always)]
    pub fn is_warm(&self) -> bool {
        self.count >= self.window.len()
    }

    /// Fold one tick into the model.
    ///
    /// Callers pass `active = true` only when the strategy is in the
    /// full quoting loop; the mean holds still otherwise (the window and
    /// deviation keep updating either way).
    pub fn observe(&mut self, mid1: f64, mid2: f64, active: bool, t_value: f64) -> SpreadReading {
        let current = mid1 - self.ratio * mid2;

        if !self.seeded {
            self.avg_ori = current;
            self.seeded = true;
        } else if active {
            self.avg_ori = (1.0 - self.alpha) * self.avg_ori + self.alpha * current;
        }

        self.window[self.position] = current;
        self.position = (self.position + 1) % self.window.len();
        if self.count < self.window.len() {
            self.count += 1;
        }

        let std_dev = if self.is_warm() { self.window_std_dev() } else { 0.0 };
        let avg = self.avg_ori + t_value;
        let deviation = if std_dev < STD_DEV_EPSILON {
            0.0
        } else {
            (current - avg) / std_dev
        };

        let reading = SpreadReading {
            current,
            avg_ori: self.avg_ori,
            avg,
            std_dev,
            deviation,
            t_value,
        };
        self.last = reading;
        reading
    }

    fn window_std_dev(&self) -> f64 {
        let n = self.count as f64;
        let mean = self.window[..self.count].iter().sum::<f64>() / n;
        let var = self.window[..self.count]
            .iter()
            .map(|s| {
                let d = s - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        var.sqrt()
    }
}

//! Cell binning and weighted accumulation

/// Triangular centering weight of `value` inside bin `index` of `axis`
///
/// 1.0 at the midpoint between the breakpoint and the next one, falling to
/// 0.0 at either bin edge. The last bin reuses the span of the bin before
/// it. Values outside the bin (clamped samples) weigh 0.
pub fn centering_weight(value: f64, axis: &[f64], index: usize) -> f64 {
    if axis.len() < 2 || index >= axis.len() {
        return 1.0;
    }
    let span = if index + 1 < axis.len() {
        axis[index + 1] - axis[index]
    } else {
        axis[index] - axis[index - 1]
    };
    if span.abs() < f64::EPSILON {
        return 1.0;
    }
    let half = span.abs() / 2.0;
    let center = axis[index] + span / 2.0;
    (1.0 - (value - center).abs() / half).clamp(0.0, 1.0)
}

/// Weighted running sum for one cell and one loop mode
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellAccumulator {
    /// Samples pushed, regardless of weight
    pub samples: usize,
    /// Sum of sample weights
    pub weight: f64,
    /// Sum of weight times value
    pub weighted_sum: f64,
}

impl CellAccumulator {
    /// Add one weighted sample
    pub fn push(&mut self, weight: f64, value: f64) {
        self.samples += 1;
        self.weight += weight;
        self.weighted_sum += weight * value;
    }

    /// Weighted mean, `None` until some weight has accumulated
    pub fn mean(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.weighted_sum / self.weight)
    }
}

/// Open-loop lambda ratios and closed-loop trims for one cell
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopCell {
    /// Lambda ratios (measured over target) from open-loop samples
    pub open: CellAccumulator,
    /// Fuel trims (%) from closed-loop samples
    pub closed: CellAccumulator,
}

impl LoopCell {
    /// Route a sample to the accumulator for its loop mode
    pub fn push(&mut self, open_loop: bool, weight: f64, ratio: f64, trim: f64) {
        if open_loop {
            self.open.push(weight, ratio);
        } else {
            self.closed.push(weight, trim);
        }
    }
}

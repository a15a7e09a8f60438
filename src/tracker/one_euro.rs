use nalgebra::Vector3;

/// 並進フィルタのサンプリング周波数 (Hz)
pub const TRANSLATION_FILTER_FREQ: f32 = 80.0;
/// 並進フィルタの速度係数
pub const TRANSLATION_FILTER_BETA: f32 = 0.01;

/// Low-pass filter component
#[derive(Debug, Clone)]
struct LowPassFilter {
    prev: Option<f32>,
}

impl LowPassFilter {
    fn new() -> Self {
        Self { prev: None }
    }

    fn filter(&mut self, value: f32, alpha: f32) -> f32 {
        match self.prev {
            Some(prev) => {
                let result = alpha * value + (1.0 - alpha) * prev;
                self.prev = Some(result);
                result
            }
            None => {
                self.prev = Some(value);
                value
            }
        }
    }
}

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
fn smoothing_factor(te: f32, cutoff: f32) -> f32 {
    let r = 2.0 * std::f32::consts::PI * cutoff * te;
    r / (r + 1.0)
}

/// One Euro Filter for a single scalar sampled at a fixed rate
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    /// サンプリング周期 (秒)
    te: f32,
    min_cutoff: f32,
    beta: f32,
    d_cutoff: f32,
    x_filter: LowPassFilter,
    dx_filter: LowPassFilter,
    prev_value: Option<f32>,
}

impl OneEuroFilter {
    pub fn new(freq: f32, min_cutoff: f32, beta: f32, d_cutoff: f32) -> Self {
        Self {
            te: 1.0 / freq,
            min_cutoff,
            beta,
            d_cutoff,
            x_filter: LowPassFilter::new(),
            dx_filter: LowPassFilter::new(),
            prev_value: None,
        }
    }

    pub fn filter(&mut self, value: f32) -> f32 {
        let dx = match self.prev_value {
            Some(prev) => (value - prev) / self.te,
            None => 0.0,
        };
        self.prev_value = Some(value);

        let edx = self
            .dx_filter
            .filter(dx, smoothing_factor(self.te, self.d_cutoff));
        let cutoff = self.min_cutoff + self.beta * edx.abs();
        self.x_filter.filter(value, smoothing_factor(self.te, cutoff))
    }
}

/// 人物ごとの並進ベクトル (x, y, z) 用フィルタ
#[derive(Debug, Clone)]
pub struct TranslationFilter {
    axes: [OneEuroFilter; 3],
}

impl TranslationFilter {
    pub fn new() -> Self {
        Self {
            axes: std::array::from_fn(|_| {
                OneEuroFilter::new(TRANSLATION_FILTER_FREQ, 1.0, TRANSLATION_FILTER_BETA, 1.0)
            }),
        }
    }

    pub fn apply(&mut self, translation: Vector3<f32>) -> Vector3<f32> {
        Vector3::new(
            self.axes[0].filter(translation.x),
            self.axes[1].filter(translation.y),
            self.axes[2].filter(translation.z),
        )
    }
}

impl Default for TranslationFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothing_factor_bounds() {
        // alpha should be between 0 and 1
        for &cutoff in &[0.1, 1.0, 10.0, 100.0] {
            for &te in &[0.001, 0.0125, 0.033, 0.1] {
                let alpha = smoothing_factor(te, cutoff);
                assert!(alpha > 0.0 && alpha < 1.0, "alpha={} for te={}, cutoff={}", alpha, te, cutoff);
            }
        }
    }

    #[test]
    fn test_filter_passthrough_first() {
        let mut f = OneEuroFilter::new(80.0, 1.0, 0.0, 1.0);
        assert_eq!(f.filter(5.0), 5.0);
    }

    #[test]
    fn test_filter_smooths() {
        let mut f = OneEuroFilter::new(80.0, 1.0, 0.0, 1.0);
        f.filter(0.0);
        let result = f.filter(10.0);
        assert!(result < 10.0, "Expected smoothing, got {}", result);
        assert!(result > 0.0, "Expected positive value, got {}", result);
    }

    #[test]
    fn test_filter_high_beta_responsive() {
        let mut f_low_beta = OneEuroFilter::new(80.0, 1.0, 0.0, 1.0);
        let mut f_high_beta = OneEuroFilter::new(80.0, 1.0, 1.0, 1.0);

        f_low_beta.filter(0.0);
        f_high_beta.filter(0.0);

        let r_low = f_low_beta.filter(10.0);
        let r_high = f_high_beta.filter(10.0);

        assert!(r_high > r_low, "High beta ({}) should be more responsive than low beta ({})", r_high, r_low);
    }

    #[test]
    fn test_filter_converges_on_constant_input() {
        let mut f = OneEuroFilter::new(80.0, 1.0, 0.01, 1.0);
        f.filter(0.0);
        let mut last = 0.0;
        for _ in 0..500 {
            last = f.filter(3.0);
        }
        assert!((last - 3.0).abs() < 1e-3, "got {}", last);
    }

    #[test]
    fn test_translation_filter_first_sample_passes_through() {
        let mut tf = TranslationFilter::new();
        let first = Vector3::new(1.0, 2.0, 300.0);
        assert_eq!(tf.apply(first), first);

        let second = tf.apply(Vector3::new(11.0, 2.0, 300.0));
        assert!(second.x > 1.0 && second.x < 11.0);
        assert!((second.y - 2.0).abs() < 1e-5);

        // 人物ごとに独立した状態を持つ
        let mut other = TranslationFilter::new();
        let fresh = Vector3::new(-5.0, 0.0, 100.0);
        assert_eq!(other.apply(fresh), fresh);
    }
}

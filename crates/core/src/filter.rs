/// First-order exponential smoothing of successive window energies.
///
/// The first update bootstraps the average straight to the observation instead
/// of blending it with the initial value.
#[derive(Debug, Clone)]
pub struct SmoothingFilter {
    value: f32,
    time_constant: f32,
    tick_interval: f32,
    initialized: bool,
}

impl SmoothingFilter {
    /// `time_constant` and `tick_interval` share a unit (seconds in the daemon).
    pub fn new(initial: f32, time_constant: f32, tick_interval: f32) -> Self {
        Self {
            value: initial,
            time_constant,
            tick_interval,
            initialized: false,
        }
    }

    pub fn alpha(&self) -> f32 {
        self.tick_interval / (self.time_constant + self.tick_interval)
    }

    pub fn update(&mut self, x: f32) -> f32 {
        if self.initialized {
            self.value += (x - self.value) * self.alpha();
        } else {
            self.value = x;
            self.initialized = true;
        }
        self.value
    }

    /// Current value. Before the first update this is the initial value.
    pub fn read(&self) -> f32 {
        self.value
    }

    /// `None` until the filter has seen a real measurement.
    pub fn reading(&self) -> Option<f32> {
        self.initialized.then_some(self.value)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

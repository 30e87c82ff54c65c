/// Shared refresh-progress monitor passed to every filter's `refresh` call.
/// Filters update `step`/`max_step`/`step_name` as they work through
/// internal phases; the engine owns `current_filter`/`filter_percent`/
/// `total_filters`/`total_percent` across the whole walk.
#[derive(Debug, Clone, Default)]
pub struct ProgressData {
    pub current_filter: String,
    pub filter_percent: f32,
    pub step: u32,
    pub max_step: u32,
    pub step_name: String,
    pub total_filters: u32,
    pub total_percent: f32,
}

impl ProgressData {
    pub fn new(total_filters: u32) -> Self {
        Self { total_filters, ..Default::default() }
    }

    pub fn begin_filter(&mut self, name: impl Into<String>) {
        self.current_filter = name.into();
        self.filter_percent = 0.0;
        self.step = 0;
        self.max_step = 0;
        self.step_name.clear();
    }

    pub fn set_step(&mut self, step: u32, max_step: u32, step_name: impl Into<String>) {
        self.step = step;
        self.max_step = max_step;
        self.step_name = step_name.into();
        self.filter_percent = if max_step == 0 { 0.0 } else { 100.0 * step as f32 / max_step as f32 };
    }
}

/// One keyframe of an animated property: at `time`, the property named by
/// `path` (a filter-path-qualified property name, e.g.
/// `"root/downsample.fraction"`) takes `value` (same string encoding
/// `FilterProperty::value` uses).
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationKeyframe {
    pub time: f64,
    pub path: String,
    pub value: String,
}

impl AnimationKeyframe {
    pub fn new(time: f64, path: impl Into<String>, value: impl Into<String>) -> Self {
        Self { time, path: path.into(), value: value.into() }
    }
}

/// Time-keyed property paths, ordered by `time`. `AnalysisState` keeps this
/// sorted so replaying an animation never needs to re-sort the whole record
/// on every insert.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimationRecord {
    keyframes: Vec<AnimationKeyframe>,
}

impl AnimationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn keyframes(&self) -> &[AnimationKeyframe] {
        &self.keyframes
    }

    pub fn insert(&mut self, kf: AnimationKeyframe) {
        let pos = self.keyframes.partition_point(|k| k.time <= kf.time);
        self.keyframes.insert(pos, kf);
    }

    /// The keyframes active at exactly `time` (every path whose most recent
    /// keyframe at or before `time` sets it), one per `path`, last-writer
    /// (by time, then insertion order) wins.
    pub fn sample(&self, time: f64) -> Vec<&AnimationKeyframe> {
        let mut by_path: Vec<&AnimationKeyframe> = Vec::new();
        for kf in &self.keyframes {
            if kf.time > time {
                continue;
            }
            if let Some(slot) = by_path.iter_mut().find(|existing| existing.path == kf.path) {
                *slot = kf;
            } else {
                by_path.push(kf);
            }
        }
        by_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_chronological_order() {
        let mut rec = AnimationRecord::new();
        rec.insert(AnimationKeyframe::new(2.0, "a", "2"));
        rec.insert(AnimationKeyframe::new(1.0, "a", "1"));
        rec.insert(AnimationKeyframe::new(3.0, "a", "3"));
        let times: Vec<f64> = rec.keyframes().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn sample_returns_latest_value_per_path_at_or_before_time() {
        let mut rec = AnimationRecord::new();
        rec.insert(AnimationKeyframe::new(0.0, "a", "0"));
        rec.insert(AnimationKeyframe::new(1.0, "a", "1"));
        rec.insert(AnimationKeyframe::new(2.0, "a", "2"));
        let sampled = rec.sample(1.5);
        assert_eq!(sampled.len(), 1);
        assert_eq!(sampled[0].value, "1");
    }
}

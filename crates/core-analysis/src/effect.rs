/// A post-processing effect entry. Effects have no defined numeric
/// behaviour in this engine (no rendering backend lives here); `AnalysisState`
/// only needs to carry them faithfully through save/load so a future
/// renderer-facing crate can interpret them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Effect {
    pub kind: String,
    pub params: Vec<(String, String)>,
}

impl Effect {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), params: Vec::new() }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

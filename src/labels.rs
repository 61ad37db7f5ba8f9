//! Class label table for the car damage model.

use anyhow::{anyhow, Result};

/// Labels emitted by the bundled car damage model, in class-index order.
pub const CAR_DAMAGE_LABELS: [&str; 17] = [
    "Bodypanel-Dent",
    "Front-Windscreen-Damage",
    "Headlight-Damage",
    "Rear-windscreen-Damage",
    "RunningBoard-Dent",
    "Sidemirror-Damage",
    "Signlight-Damage",
    "Taillight-Damage",
    "bonnet-dent",
    "boot-dent",
    "doorouter-dent",
    "fender-dent",
    "front-bumper-dent",
    "pillar-dent",
    "quaterpanel-dent",
    "rear-bumper-dent",
    "roof-dent",
];

/// Immutable, ordered table of class labels indexed by `class_index`.
///
/// Built once at startup and shared read-only by every annotator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassLabelTable {
    labels: Vec<String>,
}

impl ClassLabelTable {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("class label table must not be empty"));
        }
        if let Some(pos) = labels.iter().position(|label| label.trim().is_empty()) {
            return Err(anyhow!("class label at index {} is blank", pos));
        }
        Ok(Self { labels })
    }

    pub fn car_damage() -> Self {
        Self {
            labels: CAR_DAMAGE_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Label for a class index, or `None` when the index is out of range.
    pub fn get(&self, class_index: usize) -> Option<&str> {
        self.labels.get(class_index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for ClassLabelTable {
    fn default() -> Self {
        Self::car_damage()
    }
}

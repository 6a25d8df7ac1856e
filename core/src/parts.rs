use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;

/// Matches `name.part<digits>.rar` and `name.parte<digits>.rar`, any
/// digit run, any case. The digit run is the volume index.
fn part_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\.parte?(\d+)\.rar$").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartClass {
    Standalone,
    Part { stem: String, index: u32 },
}

/// Splits a finished filename into standalone vs. multi-volume member.
/// `stem` is the filename with the part marker and extension stripped, and
/// identifies the group all volumes of one archive share.
pub fn classify(filename: &str) -> PartClass {
    if let Some(caps) = part_pattern().captures(filename) {
        if let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) {
            if let Ok(index) = digits.as_str().parse::<u32>() {
                return PartClass::Part {
                    stem: filename[..whole.start()].to_string(),
                    index,
                };
            }
        }
    }
    PartClass::Standalone
}

#[derive(Debug, Clone)]
pub struct PartGroup {
    pub stem: String,
    pub volumes: BTreeMap<u32, PathBuf>,
}

impl PartGroup {
    /// Extraction starts from volume 1; until it shows up the group only
    /// collects.
    pub fn is_ready(&self) -> bool {
        self.volumes.contains_key(&1)
    }

    pub fn first_volume(&self) -> Option<&PathBuf> {
        self.volumes.get(&1)
    }
}

/// Multi-volume archives accumulating during a batch. Workers complete in
/// arbitrary order, so membership goes through one lock.
#[derive(Clone, Default)]
pub struct PartGroupTable {
    groups: Arc<Mutex<BTreeMap<String, PartGroup>>>,
}

impl PartGroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed download. Returns true when the file was a part
    /// volume and joined a group; false means the file is standalone.
    pub fn record(&self, filename: &str, path: &Path) -> bool {
        match classify(filename) {
            PartClass::Standalone => false,
            PartClass::Part { stem, index } => {
                if let Ok(mut groups) = self.groups.lock() {
                    groups
                        .entry(stem.clone())
                        .or_insert_with(|| PartGroup {
                            stem,
                            volumes: BTreeMap::new(),
                        })
                        .volumes
                        .insert(index, path.to_path_buf());
                }
                true
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.lock().map(|groups| groups.is_empty()).unwrap_or(true)
    }

    /// Takes every accumulated group, in stem order.
    pub fn drain(&self) -> Vec<PartGroup> {
        match self.groups.lock() {
            Ok(mut groups) => std::mem::take(&mut *groups).into_values().collect(),
            Err(_) => Vec::new(),
        }
    }
}

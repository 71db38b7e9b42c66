//! Recording filename sequence: `RECORD01.RAW` through `RECORD99.RAW`.

/// Highest session number that still produces a two-digit 8.3 name.
pub const MAX_RECORDINGS: u32 = 99;

/// Session counter shared by every recording in this process.
#[derive(Debug, Clone)]
pub struct FileSequence {
    count: u32,
    extension: String,
}

impl FileSequence {
    pub fn new(extension: impl Into<String>) -> Self {
        FileSequence {
            count: 0,
            extension: extension.into(),
        }
    }

    /// Advances the counter and returns the next name, or `None` once 99 names
    /// have been handed out. Every call consumes a number, including ones whose
    /// file later fails to open.
    pub fn next_name(&mut self) -> Option<String> {
        self.count = self.count.saturating_add(1);
        (self.count <= MAX_RECORDINGS).then(|| format_name(self.count, &self.extension))
    }

    /// Number of names requested so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl Default for FileSequence {
    fn default() -> Self {
        FileSequence::new("RAW")
    }
}

fn format_name(n: u32, extension: &str) -> String {
    format!("RECORD{n:02}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Test that names start at 01 and are zero padded.
    fn test_first_and_tenth_names() {
        let mut seq = FileSequence::default();
        assert_eq!(seq.next_name().as_deref(), Some("RECORD01.RAW"));
        for _ in 2..10 {
            seq.next_name();
        }
        assert_eq!(seq.next_name().as_deref(), Some("RECORD10.RAW"));
    }

    #[test]
    /// Test that the 100th request is refused and later ones stay refused.
    fn test_exhausted_after_99() {
        let mut seq = FileSequence::new("raw");
        for _ in 0..98 {
            assert!(seq.next_name().is_some());
        }
        assert_eq!(seq.next_name().as_deref(), Some("RECORD99.raw"));
        assert_eq!(seq.next_name(), None);
        assert_eq!(seq.next_name(), None);
    }
}

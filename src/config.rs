// Read configuration

/// Options controlling how containers are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub(crate) single_occurrence: bool,
    pub(crate) read_artwork: bool,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// When enabled (the default), a second chunk with an id that was already
    /// resolved is skipped instead of overwriting the first result.
    /// Disable it for "last wins" semantics.
    pub fn single_occurrence(mut self, enabled: bool) -> Self {
        self.single_occurrence = enabled;
        self
    }

    /// Whether embedded pictures are decoded into artwork fields
    pub fn read_artwork(mut self, enabled: bool) -> Self {
        self.read_artwork = enabled;
        self
    }

    pub fn is_single_occurrence(&self) -> bool {
        self.single_occurrence
    }

    pub fn reads_artwork(&self) -> bool {
        self.read_artwork
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            single_occurrence: true,
            read_artwork: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ReadOptions::default();
        assert!(options.is_single_occurrence());
        assert!(options.reads_artwork());

        let options = ReadOptions::new().single_occurrence(false).read_artwork(false);
        assert!(!options.is_single_occurrence());
        assert!(!options.reads_artwork());
    }
}

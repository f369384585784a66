/// Runtime settings of a [`MutableTree`](crate::MutableTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Number given to the first saved version. Zero is treated as one.
    pub initial_version: u64,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_version(mut self, version: u64) -> Self {
        self.initial_version = version;
        self
    }

    /// The first version a fresh tree will save.
    pub(crate) fn first_version(&self) -> u64 {
        self.initial_version.max(1)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self { initial_version: 1 }
    }
}

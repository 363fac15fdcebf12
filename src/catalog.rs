use crate::error::ViewerError;

/// Fixed, circular list of model paths with a cursor into it.
///
/// The list never changes after construction and is never empty, so the
/// cursor always names a valid entry.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    paths: Vec<String>,
    index: usize,
}

impl ModelCatalog {
    pub fn new(paths: Vec<String>) -> Result<Self, ViewerError> {
        if paths.is_empty() {
            return Err(ViewerError::Config("model list is empty".into()));
        }
        Ok(Self { paths, index: 0 })
    }

    pub fn current(&self) -> &str {
        &self.paths[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Moves to the next model, wrapping to the first. Returns its path.
    pub fn advance(&mut self) -> &str {
        self.index = (self.index + 1) % self.paths.len();
        self.current()
    }

    /// Moves to the previous model, wrapping to the last. Returns its path.
    pub fn retreat(&mut self) -> &str {
        let len = self.paths.len();
        self.index = (self.index + len - 1) % len;
        self.current()
    }
}

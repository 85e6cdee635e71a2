//! Pluggable path handlers dispatched by the scanner.

use std::path::Path;

use crate::outcome::CopyOutcome;

/// Moves one path out of the watched directory.
///
/// The outcome is advisory: the scanner decides whether a path is faulty by
/// checking whether it still exists after the call.
pub trait PathHandler: Send + Sync {
    /// Handle `path`, returning how the attempt went.
    fn handle(&self, path: &Path) -> CopyOutcome;
}

impl<F> PathHandler for F
where
    F: Fn(&Path) -> CopyOutcome + Send + Sync,
{
    fn handle(&self, path: &Path) -> CopyOutcome {
        self(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn closures_are_handlers() {
        let handler: Arc<dyn PathHandler> = Arc::new(|path: &Path| {
            if path.ends_with("bad") {
                CopyOutcome::retriable("nope")
            } else {
                CopyOutcome::Ok
            }
        });
        assert!(handler.handle(Path::new("/in/good")).is_ok());
        assert!(handler.handle(Path::new("/in/bad")).is_retriable());
    }
}

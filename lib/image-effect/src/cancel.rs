use crate::{ImageEffectError, ImageEffectResult};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Cooperative cancellation flag shared between a caller and a running effect.
///
/// Iterative algorithms poll it between restarts or refinement passes, never
/// in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> ImageEffectResult<()> {
        if self.is_cancelled() {
            Err(ImageEffectError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub(crate) fn check(cancel: &Option<CancelToken>) -> ImageEffectResult<()> {
    match cancel {
        Some(token) => token.check(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(ImageEffectError::Cancelled)));
    }
}

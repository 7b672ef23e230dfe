//! Progress reporting around submission and collection loops.
//!
//! Wrapping is a pass-through: the wrapped iterator yields exactly the same
//! items, so strategies behave identically with progress on or off.

use indicatif::{ProgressBar, ProgressBarIter, ProgressFinish, ProgressIterator, ProgressStyle};

/// Progress observer handed to strategies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    enabled: bool,
}

impl Progress {
    /// Draw progress bars on stderr when `enabled`
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// No output
    pub fn hidden() -> Self {
        Self::new(false)
    }

    /// Whether bars are drawn
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Progress bar for one stage of a run (e.g. "submit", "collect")
    pub fn stage(&self, label: &'static str, len: usize) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(label);
        pb
    }

    /// Wrap an iterator so each yielded item advances a stage bar
    pub fn wrap<I>(&self, label: &'static str, iter: I) -> ProgressBarIter<I>
    where
        I: ExactSizeIterator,
    {
        let bar = self.stage(label, iter.len());
        iter.progress_with(bar)
            .with_finish(ProgressFinish::WithMessage(format!("{label} complete").into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_is_pass_through() {
        let values = vec![3u64, 1, 4, 1, 5, 9, 2, 6];
        for progress in [Progress::hidden(), Progress::new(true)] {
            let seen: Vec<u64> = progress.wrap("submit", values.iter()).copied().collect();
            assert_eq!(seen, values);
        }
    }

    #[test]
    fn test_hidden_bar_is_hidden() {
        assert!(Progress::hidden().stage("collect", 10).is_hidden());
        assert!(!Progress::default().is_enabled());
    }
}

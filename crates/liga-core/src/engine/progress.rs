use crate::engine::structures::Structure;

/// What one scheduler iteration did to a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAction {
    Evolve,
    Degenerate,
}

/// Events emitted by the liga scheduler as the search runs.  The
/// structure references are only valid for the duration of the callback;
/// snapshot writers serialise them on the spot.
#[derive(Clone, Copy)]
pub enum Progress<'a> {
    Iteration {
        iteration: u64,
        action: SearchAction,
        structure: &'a Structure,
    },
    NewChampion {
        iteration: u64,
        structure: &'a Structure,
    },
    Solved {
        iteration: u64,
        structure: &'a Structure,
    },
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

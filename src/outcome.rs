use std::time::Duration;

/// Which invocation of the operation produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// The first, immediate invocation.
    Primary,
    /// A delayed duplicate started after the cutoff.
    Hedge,
}

/// Branch and success/failure of a resolved race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    PrimarySuccess,
    PrimaryFailure,
    HedgeSuccess,
    HedgeFailure,
}

impl Classification {
    pub fn new(branch: Branch, ok: bool) -> Self {
        match (branch, ok) {
            (Branch::Primary, true) => Self::PrimarySuccess,
            (Branch::Primary, false) => Self::PrimaryFailure,
            (Branch::Hedge, true) => Self::HedgeSuccess,
            (Branch::Hedge, false) => Self::HedgeFailure,
        }
    }

    pub fn branch(self) -> Branch {
        match self {
            Self::PrimarySuccess | Self::PrimaryFailure => Branch::Primary,
            Self::HedgeSuccess | Self::HedgeFailure => Branch::Hedge,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::PrimarySuccess | Self::HedgeSuccess)
    }
}

/// The winner of a single race.
///
/// Exactly one is produced per race. Losing branches never show up here.
#[derive(Debug)]
pub struct RaceOutcome<T, E> {
    /// Branch that resolved first.
    pub source: Branch,
    /// The winning branch's own result.
    pub result: Result<T, E>,
    /// Time from race start until the winner resolved.
    pub elapsed: Duration,
    /// Cutoff this race armed its hedge timer with.
    ///
    /// `None` when the primary could not even be built, so no timer was armed.
    pub cutoff: Option<Duration>,
}

impl<T, E> RaceOutcome<T, E> {
    pub fn classification(&self) -> Classification {
        Classification::new(self.source, self.result.is_ok())
    }

    /// Drops the metadata and returns the winner's result.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

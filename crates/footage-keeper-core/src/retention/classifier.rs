use crate::model::{CameraFolder, DatePath};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RetentionPhase {
    Recent,
    Historical,
    Expired,
}

impl RetentionPhase {
    fn next(self) -> Self {
        match self {
            RetentionPhase::Recent => RetentionPhase::Historical,
            RetentionPhase::Historical | RetentionPhase::Expired => RetentionPhase::Expired,
        }
    }
}

impl fmt::Display for RetentionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetentionPhase::Recent => "RECENT",
            RetentionPhase::Historical => "HISTORICAL",
            RetentionPhase::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

/// Soft ceilings for the two preserved phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    pub recent_bytes: u64,
    pub historical_bytes: u64,
}

impl Budgets {
    fn for_phase(&self, phase: RetentionPhase) -> Option<u64> {
        match phase {
            RetentionPhase::Recent => Some(self.recent_bytes),
            RetentionPhase::Historical => Some(self.historical_bytes),
            RetentionPhase::Expired => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SizedFolder {
    pub folder: CameraFolder,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ClassifiedFolder {
    pub folder: CameraFolder,
    pub size_bytes: u64,
    pub phase: RetentionPhase,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTotals {
    pub folders: usize,
    pub bytes: u64,
}

/// Folders with their phase, newest first.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub folders: Vec<ClassifiedFolder>,
}

impl Classification {
    pub fn phase_of(&self, date_path: &DatePath) -> Option<RetentionPhase> {
        self.folders
            .iter()
            .find(|c| &c.folder.date_path == date_path)
            .map(|c| c.phase)
    }

    pub fn totals(&self, phase: RetentionPhase) -> PhaseTotals {
        self.folders
            .iter()
            .filter(|c| c.phase == phase)
            .fold(PhaseTotals::default(), |acc, c| PhaseTotals {
                folders: acc.folders + 1,
                bytes: acc.bytes + c.size_bytes,
            })
    }

    pub fn in_phase(&self, phase: RetentionPhase) -> impl Iterator<Item = &ClassifiedFolder> {
        self.folders.iter().filter(move |c| c.phase == phase)
    }
}

/// Assign every folder a phase by walking newest to oldest.
///
/// A phase keeps taking folders while its running total is below its budget;
/// the folder that reaches or crosses the budget still belongs to the phase
/// in full. The next phase starts its own running total at zero. Whatever is
/// left after the historical budget is expired. A zero budget yields an empty
/// phase.
pub fn classify(mut folders: Vec<SizedFolder>, budgets: Budgets) -> Classification {
    folders.sort_by(|a, b| b.folder.date_path.cmp(&a.folder.date_path));

    let mut phase = RetentionPhase::Recent;
    let mut used: u64 = 0;
    let mut classified = Vec::with_capacity(folders.len());

    for sized in folders {
        while let Some(budget) = budgets.for_phase(phase) {
            if used < budget {
                break;
            }
            phase = phase.next();
            used = 0;
        }

        used = used.saturating_add(sized.size_bytes);
        classified.push(ClassifiedFolder {
            folder: sized.folder,
            size_bytes: sized.size_bytes,
            phase,
        });
    }

    Classification { folders: classified }
}

// Fallback stage state machine with validation
//
// The fill pipeline advances strictly forward through its strategies:
// TryingSmartFill -> TryingPlaceholder -> BuildingFromScratch -> Done.
// Each transition is driven by an explicit stage outcome, never by nested
// exception handling, so the reachable terminal state is provable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FillStage {
    TryingSmartFill,
    TryingPlaceholder,
    BuildingFromScratch,
    Done,
}

/// Get the next stage in the fallback chain
pub fn next_stage(current: FillStage) -> Option<FillStage> {
    match current {
        FillStage::TryingSmartFill => Some(FillStage::TryingPlaceholder),
        FillStage::TryingPlaceholder => Some(FillStage::BuildingFromScratch),
        FillStage::BuildingFromScratch => Some(FillStage::Done),
        FillStage::Done => None, // Terminal
    }
}

/// Validates whether the pipeline may advance from one stage to another.
/// Only single forward steps are legal; the chain never skips or rewinds.
pub fn can_advance(from: FillStage, to: FillStage) -> bool {
    next_stage(from) == Some(to)
}

/// Check if a stage is the terminal state
pub fn is_terminal_stage(stage: FillStage) -> bool {
    matches!(stage, FillStage::Done)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smart_fill_advances_to_placeholder() {
        assert_eq!(
            next_stage(FillStage::TryingSmartFill),
            Some(FillStage::TryingPlaceholder)
        );
        assert!(can_advance(
            FillStage::TryingSmartFill,
            FillStage::TryingPlaceholder
        ));
    }

    #[test]
    fn test_placeholder_advances_to_from_scratch() {
        assert_eq!(
            next_stage(FillStage::TryingPlaceholder),
            Some(FillStage::BuildingFromScratch)
        );
    }

    #[test]
    fn test_from_scratch_advances_to_done() {
        assert_eq!(
            next_stage(FillStage::BuildingFromScratch),
            Some(FillStage::Done)
        );
    }

    #[test]
    fn test_done_is_terminal() {
        assert_eq!(next_stage(FillStage::Done), None);
        assert!(is_terminal_stage(FillStage::Done));
        assert!(!is_terminal_stage(FillStage::TryingSmartFill));
    }

    #[test]
    fn test_no_skipping_stages() {
        assert!(!can_advance(
            FillStage::TryingSmartFill,
            FillStage::BuildingFromScratch
        ));
        assert!(!can_advance(FillStage::TryingSmartFill, FillStage::Done));
    }

    #[test]
    fn test_no_rewinding() {
        assert!(!can_advance(
            FillStage::TryingPlaceholder,
            FillStage::TryingSmartFill
        ));
        assert!(!can_advance(FillStage::Done, FillStage::TryingSmartFill));
    }

    #[test]
    fn test_done_always_reachable() {
        // Walking the chain from the start must terminate at Done
        let mut stage = FillStage::TryingSmartFill;
        let mut steps = 0;
        while let Some(next) = next_stage(stage) {
            stage = next;
            steps += 1;
            assert!(steps <= 3, "fallback chain must be finite");
        }
        assert_eq!(stage, FillStage::Done);
    }
}

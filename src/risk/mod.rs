// Risk management module
pub mod paper_mode;

pub use paper_mode::{
    PaperModeConfig, PaperModeState, PaperRecovery, PaperStats, PaperTransition, PaperTrip,
};

// Execution module
pub mod position_manager;

pub use position_manager::{
    evaluate_exit, OpenPosition, OpposingLevels, PaperSwitch, Position, PositionManager,
};

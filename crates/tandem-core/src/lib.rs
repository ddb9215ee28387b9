//! tandem-core: Timing and shared-state primitives for the tandem sound sandbox

pub mod authority;
pub mod clock;
mod error;
pub mod gesture;
pub mod module;
pub mod protocol;
pub mod quantize;
pub mod scheduler;
pub mod state;
pub mod sync;
pub mod tempo;

pub use authority::Authority;
pub use clock::{Clock, ManualClock, SharedClock, TimeSource, shared_clock};
pub use error::{Result, TandemError};
pub use gesture::{Gesture, Rect};
pub use module::{Instrument, ModuleKind, Rgb};
pub use protocol::{ClientMessage, Interaction, InteractionKind, ServerMessage};
pub use quantize::{
    StepCycle, TICKS_PER_MEASURE, TICKS_PER_SIXTEENTH, interval_between, quantize_tick_up,
    round_to_grid, step_interval_ticks,
};
pub use scheduler::{Callback, CommandHandle, Firing, Scheduler};
pub use state::{ClientFieldMap, ClientId, ModuleState};
pub use sync::{JoinStatus, SyncMirror};
pub use tempo::{TICKS_PER_QUARTER, TempoAnchor, TempoMap, Tick, tick_str};

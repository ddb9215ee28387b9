//! tandem-services: Realtime scheduling, relay, and client session services

pub mod audio_scheduler;
pub mod notes;
pub mod relay;
pub mod session;

pub use audio_scheduler::{AudioScheduler, FrameClock, FrameWriter, audio_scheduler, frame_counter};
pub use notes::{DEFAULT_VELOCITY, NOTE_LENGTH_TICKS, NotePlayer, NoteSink};
pub use relay::{ClientLink, Envelope, LinkSender, Outbox, Relay, RelayError, RelayHandle};
pub use session::{Session, SessionError, SessionEvent};

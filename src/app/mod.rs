//! Collaborators around the renderer: the cross-thread event channel and the
//! render-thread simulation.

pub mod events;
pub mod sim;

pub use events::{event_channel, Event, EventReceiver, EventSender};
pub use sim::{FixedTimestep, Spinner};

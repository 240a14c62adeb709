use crossbeam_channel::{Receiver, Sender, TryRecvError};

/// Messages from the window thread to the render thread.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Quit,
}

/// Window-thread end of the channel.
#[derive(Clone)]
pub struct EventSender(Sender<Event>);

/// Render-thread end of the channel.
pub struct EventReceiver(Receiver<Event>);

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (EventSender(tx), EventReceiver(rx))
}

impl EventSender {
    /// Returns `false` once the render thread has gone away.
    pub fn send(&self, event: Event) -> bool {
        self.0.send(event).is_ok()
    }
}

impl EventReceiver {
    /// Polls for an event without blocking. A disconnected sender counts as quit.
    pub fn quit_requested(&self) -> bool {
        match self.0.try_recv() {
            Ok(Event::Quit) => true,
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                log::debug!("Event sender dropped, shutting down");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_channel_keeps_running() {
        let (_tx, rx) = event_channel();
        assert!(!rx.quit_requested());
    }

    #[test]
    fn quit_is_observed() {
        let (tx, rx) = event_channel();
        assert!(tx.send(Event::Quit));
        assert!(rx.quit_requested());
    }

    #[test]
    fn dropped_sender_means_quit() {
        let (tx, rx) = event_channel();
        drop(tx);
        assert!(rx.quit_requested());
    }

    #[test]
    fn send_after_receiver_drop_reports_failure() {
        let (tx, rx) = event_channel();
        drop(rx);
        assert!(!tx.send(Event::Quit));
    }

    #[test]
    fn quit_crosses_threads() {
        let (tx, rx) = event_channel();
        let handle = std::thread::spawn(move || {
            while !rx.quit_requested() {
                std::thread::yield_now();
            }
        });
        tx.send(Event::Quit);
        handle.join().unwrap();
    }
}

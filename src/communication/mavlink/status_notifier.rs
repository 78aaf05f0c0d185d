//! STATUSTEXT notification queue
//!
//! Centralized sink for operator-visible diagnostics. Protocol code calls the
//! severity functions from any point in a handler; the dispatcher drains the
//! queue on its periodic update and turns each entry into a STATUSTEXT
//! broadcast.
//!
//! The queue is a fixed-capacity deque shared process-wide (all link
//! instances report through one funnel). When it overflows the oldest entry
//! is dropped and counted. Messages are capped at one STATUSTEXT payload;
//! everything the mission engine reports fits in 50 bytes.

use core::cell::RefCell;
use critical_section::Mutex;
use heapless::{Deque, String, Vec};
use mavlink::common::{MavSeverity, STATUSTEXT_DATA};

/// Maximum message length (one STATUSTEXT payload)
const MAX_TEXT_LEN: usize = 50;

/// Queue capacity
const QUEUE_CAPACITY: usize = 16;

/// Queued message with severity and text
#[derive(Debug)]
struct QueuedMessage {
    severity: MavSeverity,
    text: String<MAX_TEXT_LEN>,
}

/// Pending STATUSTEXT messages
struct StatusNotifier {
    queue: Deque<QueuedMessage, QUEUE_CAPACITY>,
    dropped_count: u32,
}

impl StatusNotifier {
    const fn new() -> Self {
        Self {
            queue: Deque::new(),
            dropped_count: 0,
        }
    }

    /// Enqueue a message, dropping the oldest entry when full.
    fn enqueue(&mut self, severity: MavSeverity, text: &str) {
        let text = if text.len() > MAX_TEXT_LEN {
            crate::log_warn!("STATUSTEXT truncated ({} chars)", text.len());
            &text[..MAX_TEXT_LEN]
        } else {
            text
        };

        let message = QueuedMessage {
            severity,
            text: String::try_from(text).unwrap_or_default(),
        };

        if self.queue.is_full() {
            self.queue.pop_front();
            self.dropped_count += 1;
            crate::log_warn!("STATUSTEXT queue full, dropped {}", self.dropped_count);
        }

        self.queue
            .push_back(message)
            .expect("queue has space after drop");
    }
}

/// Global notifier instance
static NOTIFIER: Mutex<RefCell<StatusNotifier>> =
    Mutex::new(RefCell::new(StatusNotifier::new()));

/// Send a CRITICAL severity message.
///
/// The mission protocol's operator-facing error channel: protocol
/// violations, storage failures, operation timeouts.
pub fn send_critical(text: &str) {
    send_statustext(MavSeverity::MAV_SEVERITY_CRITICAL, text);
}

/// Send an ERROR severity message.
pub fn send_error(text: &str) {
    send_statustext(MavSeverity::MAV_SEVERITY_ERROR, text);
}

/// Send a WARNING severity message.
pub fn send_warning(text: &str) {
    send_statustext(MavSeverity::MAV_SEVERITY_WARNING, text);
}

/// Send an INFO severity message.
pub fn send_info(text: &str) {
    send_statustext(MavSeverity::MAV_SEVERITY_INFO, text);
}

fn send_statustext(severity: MavSeverity, text: &str) {
    critical_section::with(|cs| {
        NOTIFIER.borrow(cs).borrow_mut().enqueue(severity, text);
    });
}

/// Drain all pending messages into STATUSTEXT payloads.
///
/// Called by the dispatcher on its periodic update.
pub fn take_pending() -> Vec<STATUSTEXT_DATA, QUEUE_CAPACITY> {
    let mut result = Vec::new();

    critical_section::with(|cs| {
        let mut notifier = NOTIFIER.borrow(cs).borrow_mut();
        while let Some(message) = notifier.queue.pop_front() {
            let bytes = message.text.as_bytes();
            let mut text_bytes = [0u8; MAX_TEXT_LEN];
            text_bytes[..bytes.len()].copy_from_slice(bytes);

            let _ = result.push(STATUSTEXT_DATA {
                severity: message.severity,
                text: text_bytes.into(),
                ..Default::default()
            });
        }
    });

    result
}

/// Clear queue and counters between tests.
#[cfg(test)]
pub(crate) fn reset() {
    critical_section::with(|cs| {
        let mut notifier = NOTIFIER.borrow(cs).borrow_mut();
        notifier.queue.clear();
        notifier.dropped_count = 0;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    // The notifier is a process-wide global; run these serially
    use serial_test::serial;

    fn dropped_count() -> u32 {
        critical_section::with(|cs| NOTIFIER.borrow(cs).borrow().dropped_count)
    }

    #[test]
    #[serial]
    fn test_enqueue_drain_cycle() {
        reset();

        send_critical("Operation timeout");
        send_warning("Not all mission items sent");

        let messages = take_pending();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0].severity,
            MavSeverity::MAV_SEVERITY_CRITICAL
        );
        assert_eq!(
            messages[1].severity,
            MavSeverity::MAV_SEVERITY_WARNING
        );

        let text: &[u8] = messages[0].text.as_ref();
        assert!(text.starts_with(b"Operation timeout"));
        // Remainder is null padding
        assert!(text["Operation timeout".len()..].iter().all(|&b| b == 0));
    }

    #[test]
    #[serial]
    fn test_drain_empties_queue() {
        reset();

        send_info("one");
        let _ = take_pending();
        assert!(take_pending().is_empty());
    }

    #[test]
    #[serial]
    fn test_queue_overflow_drops_oldest() {
        reset();

        for i in 0..QUEUE_CAPACITY + 2 {
            send_info(&format!("message {}", i));
        }

        let messages = take_pending();
        assert_eq!(messages.len(), QUEUE_CAPACITY);
        assert_eq!(dropped_count(), 2);

        // Oldest two were dropped
        let text: &[u8] = messages[0].text.as_ref();
        assert!(text.starts_with(b"message 2"));
    }

    #[test]
    #[serial]
    fn test_long_message_truncated() {
        reset();

        let long = "A".repeat(80);
        send_error(&long);

        let messages = take_pending();
        assert_eq!(messages.len(), 1);
        let text: &[u8] = messages[0].text.as_ref();
        assert!(text.iter().all(|&b| b == b'A'));
    }
}

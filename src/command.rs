//! Command: single-key instructions from the console thread to the recording loop.
//! All variants are fixed-size so they can be stored in the SPSC ring buffer.

use std::ops::ControlFlow;
use std::sync::Arc;

use crate::controller::RecordingController;
use crate::error::RecorderError;
use crate::ring_buffer::RingBuffer;
use crate::storage::StorageDevice;

/// Instruction from the console to the recording loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Prepare,
    Start,
    Stop,
    Status,
    ToggleWriteTiming,
    ClearOverrun,
    Help,
    Quit,
}

impl Command {
    /// Maps a console key to its command. Case-insensitive.
    pub fn from_key(key: char) -> Option<Command> {
        match key.to_ascii_lowercase() {
            'p' => Some(Command::Prepare),
            'r' => Some(Command::Start),
            's' => Some(Command::Stop),
            'i' => Some(Command::Status),
            't' => Some(Command::ToggleWriteTiming),
            'c' => Some(Command::ClearOverrun),
            'h' | '?' => Some(Command::Help),
            'q' => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Help lines, one per key.
pub const HELP: &[&str] = &[
    "  p   Prepare storage",
    "  r   Start a new recording",
    "  s   Stop recording",
    "  i   Status",
    "  t   Toggle write timing",
    "  c   Clear overrun flag",
    "  h   This message",
    "  q   Stop and quit",
];

/// Applies `cmd` to the controller.
///
/// Rejected transitions are already logged by the controller and are not errors
/// here; only failures the recorder cannot continue after are returned.
pub fn execute<D: StorageDevice>(
    cmd: Command,
    controller: &mut RecordingController<D>,
) -> Result<ControlFlow<()>, RecorderError> {
    let result = match cmd {
        Command::Prepare => controller.prepare(),
        Command::Start => controller.start().map(|_| ()),
        Command::Stop => controller.stop(),
        Command::Status => {
            log::info!("{}", controller.status());
            Ok(())
        }
        Command::ToggleWriteTiming => {
            let enabled = !controller.print_write_timing();
            controller.set_print_write_timing(enabled);
            log::info!("Write timing {}", if enabled { "on" } else { "off" });
            Ok(())
        }
        Command::ClearOverrun => {
            controller.clear_queue_overrun();
            Ok(())
        }
        Command::Help => {
            for line in HELP {
                log::info!("{line}");
            }
            Ok(())
        }
        Command::Quit => {
            if controller.state() == crate::controller::RecordingState::Recording {
                controller.stop()?;
            }
            return Ok(ControlFlow::Break(()));
        }
    };
    match result {
        Err(err) if err.is_fatal() => Err(err),
        _ => Ok(ControlFlow::Continue(())),
    }
}

/// Producer side of the command channel. Only the console thread should hold this.
///
/// Not `Clone`, and sending needs `&mut self`, so a shared sender cannot send:
///
/// ```compile_fail
/// use std::sync::Arc;
/// use sdrec::command::{command_channel, Command};
///
/// let (sender, _receiver) = command_channel(4);
/// let shared = Arc::new(sender);
/// let other = Arc::clone(&shared);
/// std::thread::spawn(move || other.try_send(Command::Start));
/// shared.try_send(Command::Stop);
/// ```
pub struct CommandSender {
    inner: Arc<RingBuffer<Command>>,
}

impl CommandSender {
    /// Returns `Err(cmd)` if the buffer is full.
    pub fn try_send(&mut self, cmd: Command) -> Result<(), Command> {
        // SAFETY: the only sender, borrowed mutably.
        unsafe { self.inner.try_send(cmd) }
    }
}

/// Consumer side of the command channel, drained by the recording loop every tick.
///
/// ```compile_fail
/// use sdrec::command::command_channel;
///
/// let (_sender, receiver) = command_channel(4);
/// let second = receiver.clone();
/// ```
pub struct CommandReceiver {
    inner: Arc<RingBuffer<Command>>,
}

impl CommandReceiver {
    /// Next pending command, or `None` if nothing is waiting.
    pub fn try_recv(&mut self) -> Option<Command> {
        // SAFETY: the only receiver, borrowed mutably.
        unsafe { self.inner.try_recv() }
    }
}

/// Creates the one sender and one receiver of a command channel.
pub fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let arc = Arc::new(RingBuffer::<Command>::new(capacity));
    (
        CommandSender { inner: arc.clone() },
        CommandReceiver { inner: arc },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use crate::controller::{recording_pipeline, RecordingState};
    use crate::storage::MemDevice;

    #[test]
    /// Test that command stays small enough for a ring buffer slot.
    fn test_command_is_small() {
        assert!(std::mem::size_of::<Command>() <= 1);
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(Command::from_key('p'), Some(Command::Prepare));
        assert_eq!(Command::from_key('R'), Some(Command::Start));
        assert_eq!(Command::from_key('?'), Some(Command::Help));
        assert_eq!(Command::from_key('x'), None);
    }

    #[test]
    fn test_command_channel_send_recv() {
        let (mut sender, mut receiver) = command_channel(4);
        sender.try_send(Command::Start).unwrap();
        assert_eq!(receiver.try_recv(), Some(Command::Start));
        assert_eq!(receiver.try_recv(), None);
    }

    #[test]
    /// Test that commands sent from the console thread arrive once each, in order.
    fn test_command_channel_across_threads() {
        let (mut sender, mut receiver) = command_channel(2);
        let keys = ['p', 'r', 's', 'i', 't', 'c', 'h', 'q'];
        let console = std::thread::spawn(move || {
            for _ in 0..500 {
                for key in keys {
                    let mut cmd = Command::from_key(key).unwrap();
                    while let Err(back) = sender.try_send(cmd) {
                        cmd = back;
                        std::thread::yield_now();
                    }
                }
            }
        });

        let expected: Vec<Command> = keys.iter().filter_map(|k| Command::from_key(*k)).collect();
        let mut received = 0;
        while received < 500 * expected.len() {
            match receiver.try_recv() {
                Some(cmd) => {
                    assert_eq!(cmd, expected[received % expected.len()]);
                    received += 1;
                }
                None => std::thread::yield_now(),
            }
        }
        console.join().unwrap();
        assert_eq!(receiver.try_recv(), None);
    }

    #[test]
    /// Test that the prepare key moves a fresh recorder to Stopped.
    fn test_prepare_command_from_unprepared() {
        let (mut controller, _producer) =
            recording_pipeline(MemDevice::new(), &RecorderConfig::default()).unwrap();
        assert_eq!(controller.state(), RecordingState::Unprepared);
        execute(Command::Prepare, &mut controller).unwrap();
        assert_eq!(controller.state(), RecordingState::Stopped);
    }

    #[test]
    /// Test that a rejected transition keeps the loop running.
    fn test_execute_ignores_rejected_transition() {
        let (mut controller, _producer) =
            recording_pipeline(MemDevice::new(), &RecorderConfig::default()).unwrap();
        let flow = execute(Command::Start, &mut controller).unwrap();
        assert_eq!(flow, ControlFlow::Continue(()));
        assert_eq!(controller.state(), RecordingState::Unprepared);
    }

    #[test]
    /// Test that a mount failure is surfaced to the caller.
    fn test_execute_propagates_fatal() {
        let (mut controller, _producer) =
            recording_pipeline(MemDevice::unmountable(), &RecorderConfig::default()).unwrap();
        let err = execute(Command::Prepare, &mut controller).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_quit_stops_recording() {
        let (mut controller, _producer) =
            recording_pipeline(MemDevice::new(), &RecorderConfig::default()).unwrap();
        execute(Command::Prepare, &mut controller).unwrap();
        execute(Command::Start, &mut controller).unwrap();
        assert_eq!(controller.state(), RecordingState::Recording);
        let flow = execute(Command::Quit, &mut controller).unwrap();
        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(controller.state(), RecordingState::Stopped);
    }

    #[test]
    fn test_toggle_write_timing() {
        let (mut controller, _producer) =
            recording_pipeline(MemDevice::new(), &RecorderConfig::default()).unwrap();
        execute(Command::ToggleWriteTiming, &mut controller).unwrap();
        assert!(controller.print_write_timing());
        execute(Command::ToggleWriteTiming, &mut controller).unwrap();
        assert!(!controller.print_write_timing());
    }
}

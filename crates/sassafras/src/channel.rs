//! Subprocess channel to the compiler.
//!
//! Owns the compiler process and the stream its stdin/stdout are bound
//! to. The child's ends come from a `UnixStream::pair()` rather than
//! anonymous pipes: socket pairs survive the host runtime's pipe
//! handling quirks and support read timeouts.
//!
//! Framing is `[length: u32 little-endian][postcard payload]`, one whole
//! frame per send/receive, never interleaved. The driver is the single
//! reader and single writer.

use std::io::{Read, Write};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use camino::Utf8Path;
use tracing::debug;

use sassafras_protocol::{self as proto, InboundMessage, OutboundMessage};

use crate::error::{LifecycleError, ProtocolError};

/// Upper bound on a single frame; a length prefix beyond this is treated
/// as garbage rather than an allocation request.
const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

pub(crate) struct Channel {
    child: Option<Child>,
    stream: UnixStream,
}

impl Channel {
    /// Spawn the compiler with stdin and stdout bound to our socket pair
    /// and stderr discarded.
    pub(crate) fn spawn(
        path: &Utf8Path,
        args: &[String],
        cwd: Option<&Utf8Path>,
    ) -> Result<Self, LifecycleError> {
        let spawn_err = |source: std::io::Error| LifecycleError::Spawn {
            path: path.to_owned(),
            source,
        };

        let (host_end, child_end) = UnixStream::pair().map_err(spawn_err)?;
        let child_stdin = child_end.try_clone().map_err(spawn_err)?;

        let mut command = Command::new(path.as_std_path());
        command
            .args(args)
            .stdin(Stdio::from(OwnedFd::from(child_stdin)))
            .stdout(Stdio::from(OwnedFd::from(child_end)))
            .stderr(Stdio::null());
        if let Some(cwd) = cwd {
            command.current_dir(cwd.as_std_path());
        }

        let child = command.spawn().map_err(spawn_err)?;
        debug!(pid = child.id(), %path, "spawned compiler");

        Ok(Self {
            child: Some(child),
            stream: host_end,
        })
    }

    /// A channel over an existing stream, with no child behind it. Lets
    /// tests script the far side of the conversation.
    #[cfg(test)]
    pub(crate) fn from_stream(stream: UnixStream) -> Self {
        Self {
            child: None,
            stream,
        }
    }

    /// Write one framed message.
    pub(crate) fn send(&mut self, message: &InboundMessage) -> Result<(), ProtocolError> {
        let frame =
            proto::encode_frame(message).map_err(|err| ProtocolError::Encode(err.to_string()))?;
        self.stream.write_all(&frame)?;
        Ok(())
    }

    /// Read one framed message, waiting at most `timeout` (`None` blocks
    /// forever).
    pub(crate) fn receive(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<OutboundMessage, ProtocolError> {
        self.stream.set_read_timeout(timeout)?;

        let mut prefix = [0u8; 4];
        self.read_exact(&mut prefix)?;
        let len = u32::from_le_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::Decode(format!(
                "frame length {len} exceeds maximum"
            )));
        }

        let mut payload = vec![0u8; len];
        self.read_exact(&mut payload)?;
        proto::decode_frame(&payload).map_err(|err| ProtocolError::Decode(err.to_string()))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        match self.stream.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                Err(ProtocolError::Timeout)
            }
            Err(err) => Err(ProtocolError::Io(err)),
        }
    }

    /// Kill the child and close the socket. Idempotent, does not wait for
    /// the child beyond a non-blocking reap.
    pub(crate) fn terminate(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.try_wait();
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    pub(crate) fn process_id(&self) -> u32 {
        self.child.as_ref().map(|child| child.id()).unwrap_or(0)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn pair() -> (Channel, UnixStream) {
        let (host_end, far_end) = UnixStream::pair().expect("socket pair");
        (Channel::from_stream(host_end), far_end)
    }

    fn log_event(message: &str) -> OutboundMessage {
        OutboundMessage::LogEvent(proto::LogEvent {
            compilation_id: 1001,
            kind: proto::LogEventKind::Debug,
            message: message.to_string(),
            span: None,
            stack_trace: None,
        })
    }

    #[test]
    fn send_and_receive_framed_messages() {
        let (mut channel, mut far_end) = pair();

        let request = InboundMessage::CanonicalizeResponse(proto::CanonicalizeResponse {
            id: 17,
            result: proto::CanonicalizeResult::NotHandled,
        });
        channel.send(&request).expect("send succeeds");

        // The far side sees exactly one frame with our payload.
        let mut prefix = [0u8; 4];
        far_end.read_exact(&mut prefix).unwrap();
        let len = u32::from_le_bytes(prefix) as usize;
        let mut payload = vec![0u8; len];
        far_end.read_exact(&mut payload).unwrap();
        let echoed: InboundMessage = proto::decode_frame(&payload).unwrap();
        assert_eq!(echoed, request);

        // And a frame written by the far side comes back parsed.
        let event = log_event("ping");
        far_end.write_all(&proto::encode_frame(&event).unwrap()).unwrap();
        let received = channel.receive(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(received, event);
    }

    #[test]
    fn receive_times_out_when_nothing_arrives() {
        let (mut channel, _far_end) = pair();
        let result = channel.receive(Some(Duration::from_millis(50)));
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[test]
    fn receive_reports_io_error_after_peer_hangs_up() {
        let (mut channel, far_end) = pair();
        drop(far_end);
        let result = channel.receive(Some(Duration::from_secs(1)));
        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }

    #[test]
    fn garbage_length_prefix_is_rejected() {
        let (mut channel, mut far_end) = pair();
        far_end.write_all(&u32::MAX.to_le_bytes()).unwrap();
        let result = channel.receive(Some(Duration::from_secs(1)));
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn split_frame_reassembles() {
        let (mut channel, mut far_end) = pair();
        let event = log_event("slow frame");
        let frame = proto::encode_frame(&event).unwrap();
        let (first, second) = frame.split_at(frame.len() / 2);

        let first = first.to_vec();
        let second = second.to_vec();
        let writer = thread::spawn(move || {
            far_end.write_all(&first).unwrap();
            thread::sleep(Duration::from_millis(20));
            far_end.write_all(&second).unwrap();
            far_end
        });

        let received = channel.receive(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(received, event);
        drop(writer.join().unwrap());
    }

    #[test]
    fn terminate_is_idempotent() {
        let (mut channel, _far_end) = pair();
        channel.terminate();
        channel.terminate();
        assert_eq!(channel.process_id(), 0);
    }

    #[test]
    fn spawn_failure_is_a_lifecycle_error() {
        let missing = Utf8Path::new("/nonexistent/sass-compiler");
        let result = Channel::spawn(missing, &[], None);
        assert!(matches!(result, Err(LifecycleError::Spawn { .. })));
    }
}

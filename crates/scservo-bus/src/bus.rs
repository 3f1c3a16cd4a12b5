use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use scservo_frame::{Command, FrameError, FrameWriter, Packet, StreamFramer, BROADCAST_ID, MAX_ID};
use tracing::{debug, trace, warn};

use crate::error::{BusError, Result};

/// Default time a servo gets to answer a command.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(40);

const READ_CHUNK_SIZE: usize = 64;

/// Bus-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// How long every endpoint waits for a response before failing with
    /// [`BusError::Timeout`]. Default: 40 ms.
    pub response_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

/// Receiver for the responses addressed to one registered id.
pub trait InboundSink: Send + Sync {
    /// Called from the feeding thread for every valid response frame.
    fn on_response(&self, status: Command, params: Bytes);
}

/// Counters for inbound traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Responses handed to a registered endpoint.
    pub delivered: u64,
    /// Half-duplex echoes of our own commands.
    pub echoes: u64,
    /// Frames dropped for a bad checksum.
    pub checksum_errors: u64,
    /// Responses for ids nobody registered.
    pub unknown_ids: u64,
    /// Frames dropped for a bad length or command byte.
    pub malformed: u64,
}

type Sink = Arc<dyn InboundSink>;

/// One physical servo bus shared by many endpoints.
///
/// Owns the transmit path, the inbound framer and the id registration table.
/// Each sits behind its own mutex; when two are held the order is
/// framer, then table, then writer.
pub struct Bus {
    writer: Mutex<FrameWriter<Box<dyn Write + Send>>>,
    framer: Mutex<StreamFramer>,
    endpoints: Mutex<HashMap<u8, Sink>>,
    stats: Mutex<BusStats>,
    config: BusConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reject ids an endpoint can never own.
pub(crate) fn check_id(id: u8) -> Result<()> {
    if id > MAX_ID {
        return Err(BusError::InvalidId(id));
    }
    Ok(())
}

impl Bus {
    /// Create a bus transmitting on `writer` with default settings.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self::with_config(writer, BusConfig::default())
    }

    /// Create a bus with explicit settings.
    pub fn with_config<W: Write + Send + 'static>(writer: W, config: BusConfig) -> Self {
        Self {
            writer: Mutex::new(FrameWriter::new(Box::new(writer))),
            framer: Mutex::new(StreamFramer::new()),
            endpoints: Mutex::new(HashMap::new()),
            stats: Mutex::new(BusStats::default()),
            config,
        }
    }

    /// Bus settings.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Route responses for `id` to `sink`.
    pub fn register(&self, id: u8, sink: Arc<dyn InboundSink>) -> Result<()> {
        check_id(id)?;
        let mut endpoints = lock(&self.endpoints);
        if endpoints.contains_key(&id) {
            return Err(BusError::IdAlreadyRegistered(id));
        }
        endpoints.insert(id, sink);
        debug!(id, "registered endpoint");
        Ok(())
    }

    /// Drop the registration for `id`, if any.
    pub fn unregister(&self, id: u8) {
        if lock(&self.endpoints).remove(&id).is_some() {
            debug!(id, "unregistered endpoint");
        }
    }

    /// Drop the registration for `id` only while it still points at `sink`.
    pub(crate) fn release(&self, id: u8, sink: &Sink) {
        let mut endpoints = lock(&self.endpoints);
        if endpoints.get(&id).is_some_and(|current| Arc::ptr_eq(current, sink)) {
            endpoints.remove(&id);
            debug!(id, "released endpoint");
        }
    }

    /// Whether an endpoint currently owns `id`.
    pub fn is_registered(&self, id: u8) -> bool {
        lock(&self.endpoints).contains_key(&id)
    }

    /// Registered ids in ascending order.
    pub fn registered_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = lock(&self.endpoints).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Write encoded bytes to the line and flush.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        trace!(len = bytes.len(), frame = ?bytes, "transmit");
        lock(&self.writer).send_raw(bytes)?;
        Ok(())
    }

    /// Encode and write one command frame.
    pub fn send_frame(&self, id: u8, command: Command, address: u8, params: &[u8]) -> Result<()> {
        if id == BROADCAST_ID {
            debug!(register = address, "broadcast command, no response expected");
        }
        lock(&self.writer).send(id, command, address, params)?;
        Ok(())
    }

    /// Write `bytes` and register `sink` under `id` as one step.
    ///
    /// The table stays locked across the write, so a response to this very
    /// frame cannot be routed before the registration exists.
    pub(crate) fn send_and_register(&self, bytes: &[u8], id: u8, sink: Sink) -> Result<()> {
        check_id(id)?;
        let mut endpoints = lock(&self.endpoints);
        if endpoints.contains_key(&id) {
            return Err(BusError::IdAlreadyRegistered(id));
        }
        trace!(len = bytes.len(), frame = ?bytes, "transmit");
        lock(&self.writer).send_raw(bytes)?;
        endpoints.insert(id, sink);
        debug!(id, "registered endpoint");
        Ok(())
    }

    /// Push inbound bytes through the framer and dispatch complete frames.
    pub fn feed(&self, bytes: &[u8]) {
        let mut framer = lock(&self.framer);
        for byte in bytes {
            if let Some(outcome) = framer.push(*byte) {
                self.dispatch(outcome);
            }
        }
    }

    fn dispatch(&self, outcome: scservo_frame::Result<Packet>) {
        match outcome {
            Ok(Packet::Echo { id, command }) => {
                debug!(id, command = command.name(), "dropping echo");
                lock(&self.stats).echoes += 1;
            }
            Ok(Packet::Response {
                id,
                command,
                params,
            }) => {
                let sink = lock(&self.endpoints).get(&id).cloned();
                match sink {
                    Some(sink) => {
                        trace!(id, len = params.len(), "response");
                        lock(&self.stats).delivered += 1;
                        sink.on_response(command, params);
                    }
                    None => {
                        warn!(id, "response for unregistered id dropped");
                        lock(&self.stats).unknown_ids += 1;
                    }
                }
            }
            Err(FrameError::ChecksumMismatch { expected, actual }) => {
                warn!(expected, actual, "checksum mismatch, frame dropped");
                lock(&self.stats).checksum_errors += 1;
            }
            Err(err) => {
                warn!(error = %err, "malformed frame dropped");
                lock(&self.stats).malformed += 1;
            }
        }
    }

    /// Snapshot of the inbound counters.
    pub fn stats(&self) -> BusStats {
        *lock(&self.stats)
    }

    /// Feed everything `reader` yields on a background thread.
    ///
    /// The thread stops on end of stream, on a hard read error or when the
    /// returned handle is stopped. Timeouts and interrupts are retried.
    pub fn spawn_reader<R: Read + Send + 'static>(self: &Arc<Self>, mut reader: R) -> Result<ReaderHandle> {
        let bus = Arc::clone(self);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = std::thread::Builder::new()
            .name("scservo-reader".to_string())
            .spawn(move || -> Result<()> {
                let mut chunk = [0u8; READ_CHUNK_SIZE];
                while flag.load(Ordering::Acquire) {
                    match reader.read(&mut chunk) {
                        Ok(0) => {
                            debug!("bus stream closed");
                            return Ok(());
                        }
                        Ok(n) => bus.feed(&chunk[..n]),
                        Err(err)
                            if matches!(
                                err.kind(),
                                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                            ) =>
                        {
                            continue
                        }
                        Err(err) => {
                            warn!(error = %err, "bus read failed, reader stopping");
                            return Err(BusError::Io(err));
                        }
                    }
                }
                debug!("reader stopped");
                Ok(())
            })?;

        Ok(ReaderHandle { running, thread })
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("registered", &self.registered_ids())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a reader thread started by [`Bus::spawn_reader`].
#[derive(Debug)]
pub struct ReaderHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<Result<()>>,
}

impl ReaderHandle {
    /// Whether the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Ask the thread to stop and wait for it.
    ///
    /// Returns after the current blocking read times out.
    pub fn stop(self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        self.thread
            .join()
            .map_err(|_| BusError::Disconnected("reader thread panicked".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use scservo_frame::{decode_frame, encode_frame, encode_response, register};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Command, Bytes)>>,
    }

    impl InboundSink for Recorder {
        fn on_response(&self, status: Command, params: Bytes) {
            self.seen.lock().unwrap().push((status, params));
        }
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn wait_finished(handle: &ReaderHandle) {
        while !handle.is_finished() {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn reply(id: u8, params: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_response(id, Command::Response, params, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn routes_response_to_owner() {
        let bus = Bus::new(std::io::sink());
        let one = Arc::new(Recorder::default());
        let two = Arc::new(Recorder::default());
        bus.register(1, one.clone()).unwrap();
        bus.register(2, two.clone()).unwrap();

        bus.feed(&reply(2, &[0x01, 0x00]));

        assert!(one.seen.lock().unwrap().is_empty());
        let seen = two.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1.as_ref(), &[0x01, 0x00]);
        assert_eq!(bus.stats().delivered, 1);
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let bus = Bus::new(std::io::sink());
        let first = Arc::new(Recorder::default());
        bus.register(4, first.clone()).unwrap();

        let err = bus.register(4, Arc::new(Recorder::default())).unwrap_err();
        assert!(matches!(err, BusError::IdAlreadyRegistered(4)));

        bus.feed(&reply(4, &[]));
        assert_eq!(first.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn invalid_ids_are_refused() {
        let bus = Bus::new(std::io::sink());
        let err = bus.register(BROADCAST_ID, Arc::new(Recorder::default())).unwrap_err();
        assert!(matches!(err, BusError::InvalidId(BROADCAST_ID)));
        assert!(bus.registered_ids().is_empty());
    }

    #[test]
    fn unregister_is_idempotent() {
        let bus = Bus::new(std::io::sink());
        bus.register(3, Arc::new(Recorder::default())).unwrap();
        bus.register(1, Arc::new(Recorder::default())).unwrap();
        assert_eq!(bus.registered_ids(), vec![1, 3]);

        bus.unregister(3);
        bus.unregister(3);
        assert!(!bus.is_registered(3));
        assert_eq!(bus.registered_ids(), vec![1]);
    }

    #[test]
    fn release_ignores_foreign_registration() {
        let bus = Bus::new(std::io::sink());
        let owner: Sink = Arc::new(Recorder::default());
        let stranger: Sink = Arc::new(Recorder::default());
        bus.register(6, owner.clone()).unwrap();

        bus.release(6, &stranger);
        assert!(bus.is_registered(6));
        bus.release(6, &owner);
        assert!(!bus.is_registered(6));
    }

    #[test]
    fn echoes_and_noise_are_not_delivered() {
        let bus = Bus::new(std::io::sink());
        let sink = Arc::new(Recorder::default());
        bus.register(1, sink.clone()).unwrap();

        let mut wire = BytesMut::new();
        encode_frame(1, Command::Write, register::TORQUE_ENABLE, &[1], &mut wire).unwrap();
        let mut stream = vec![0x00, 0x42, 0x13];
        stream.extend_from_slice(&wire);
        stream.extend(reply(1, &[]));
        stream.extend([0x99, 0x98]);

        bus.feed(&stream);

        assert_eq!(sink.seen.lock().unwrap().len(), 1);
        let stats = bus.stats();
        assert_eq!(stats.echoes, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[test]
    fn corrupt_and_unknown_frames_are_counted() {
        let bus = Bus::new(std::io::sink());
        let sink = Arc::new(Recorder::default());
        bus.register(1, sink.clone()).unwrap();

        let mut bad = reply(1, &[0x02, 0x00]);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        bus.feed(&bad);
        bus.feed(&reply(9, &[]));
        bus.feed(&[0xFF, 0xFF, 0x01, 0x00]);

        assert!(sink.seen.lock().unwrap().is_empty());
        let stats = bus.stats();
        assert_eq!(stats.checksum_errors, 1);
        assert_eq!(stats.unknown_ids, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.delivered, 0);
    }

    #[test]
    fn frames_split_across_feeds() {
        let bus = Bus::new(std::io::sink());
        let sink = Arc::new(Recorder::default());
        bus.register(1, sink.clone()).unwrap();

        let frame = reply(1, &[0x03, 0xFF]);
        let (head, tail) = frame.split_at(3);
        bus.feed(head);
        assert!(sink.seen.lock().unwrap().is_empty());
        bus.feed(tail);
        assert_eq!(sink.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn send_frame_writes_in_order() {
        let capture = Capture::default();
        let bus = Bus::new(capture.clone());

        bus.send_frame(1, Command::Write, register::LOCK, &[0]).unwrap();
        bus.send_frame(1, Command::Write, register::ID, &[2]).unwrap();

        let wire = capture.0.lock().unwrap().clone();
        assert_eq!(decode_frame(&wire[..8]).unwrap().address, register::LOCK);
        assert_eq!(decode_frame(&wire[8..]).unwrap().address, register::ID);
    }

    #[test]
    fn send_and_register_refuses_taken_id_without_writing() {
        let capture = Capture::default();
        let bus = Bus::new(capture.clone());
        bus.register(2, Arc::new(Recorder::default())).unwrap();

        let err = bus
            .send_and_register(&[0xFF, 0xFF], 2, Arc::new(Recorder::default()))
            .unwrap_err();
        assert!(matches!(err, BusError::IdAlreadyRegistered(2)));
        assert!(capture.0.lock().unwrap().is_empty());
    }

    #[test]
    fn reader_thread_feeds_until_eof() {
        let bus = Arc::new(Bus::new(std::io::sink()));
        let sink = Arc::new(Recorder::default());
        bus.register(5, sink.clone()).unwrap();

        let mut stream = reply(5, &[0x01, 0x00]);
        stream.extend(reply(5, &[]));
        let handle = bus.spawn_reader(Cursor::new(stream)).unwrap();
        wait_finished(&handle);
        handle.stop().unwrap();

        assert_eq!(sink.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn reader_thread_reports_hard_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::BrokenPipe))
            }
        }

        let bus = Arc::new(Bus::new(std::io::sink()));
        let handle = bus.spawn_reader(Broken).unwrap();
        wait_finished(&handle);
        assert!(matches!(handle.stop(), Err(BusError::Io(_))));
    }
}

//! Simulated servos on an in-memory bus.
//!
//! Every frame the bus writes is decoded by a device task that keeps a small
//! register file per servo, plays back the half-duplex echo and answers the
//! way SCS firmware does. Built for tests and demos; needs a tokio runtime.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::BytesMut;
use scservo_frame::{decode_frame, encode_response, register, Command, Frame};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::bus::{Bus, BusConfig};

/// Size of the simulated control table.
pub const REGISTER_COUNT: usize = 64;

/// One simulated servo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockServo {
    /// Id the servo currently answers on.
    pub id: u8,
    /// Control table, indexed by register address.
    pub registers: [u8; REGISTER_COUNT],
    /// Never answer.
    pub silent: bool,
    /// Answer reads with a single byte.
    pub short_reads: bool,
}

impl MockServo {
    fn new(id: u8) -> Self {
        let mut registers = [0u8; REGISTER_COUNT];
        registers[usize::from(register::ID)] = id;
        registers[usize::from(register::LOCK)] = 1;
        Self {
            id,
            registers,
            silent: false,
            short_reads: false,
        }
    }

    /// Store `bytes` starting at `address`; bytes past the table are dropped.
    pub fn set_registers(&mut self, address: u8, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            if let Some(slot) = self.registers.get_mut(usize::from(address) + i) {
                *slot = *byte;
            }
        }
    }

    fn word(&self, address: u8) -> u16 {
        let at = usize::from(address);
        u16::from_be_bytes([self.registers[at], self.registers[at + 1]])
    }

    /// Torque enable register is non-zero.
    pub fn torque(&self) -> bool {
        self.registers[usize::from(register::TORQUE_ENABLE)] != 0
    }

    /// EEPROM lock register is non-zero.
    pub fn locked(&self) -> bool {
        self.registers[usize::from(register::LOCK)] != 0
    }

    /// Raw goal position.
    pub fn goal_position(&self) -> u16 {
        self.word(register::GOAL_POSITION)
    }

    /// Goal time in milliseconds.
    pub fn goal_time(&self) -> u16 {
        self.word(register::GOAL_TIME)
    }

    /// Raw present position.
    pub fn present_position(&self) -> u16 {
        self.word(register::PRESENT_POSITION)
    }

    /// Offset register as stored on the wire.
    pub fn offset_bytes(&self) -> [u8; 2] {
        let at = usize::from(register::OFFSET);
        [self.registers[at], self.registers[at + 1]]
    }

    fn write(&mut self, address: u8, params: &[u8]) {
        if register::is_eeprom(address) && self.locked() {
            debug!(id = self.id, register = register::register_name(address), "write ignored, EEPROM locked");
            return;
        }
        self.set_registers(address, params);
        if address == register::GOAL_POSITION && params.len() >= 2 {
            // Moves complete instantly.
            self.set_registers(register::PRESENT_POSITION, &params[..2]);
        }
    }

    fn read(&self, address: u8, len: usize) -> Vec<u8> {
        let start = usize::from(address).min(REGISTER_COUNT);
        let end = (start + len).min(REGISTER_COUNT);
        let mut data = self.registers[start..end].to_vec();
        if self.short_reads {
            data.truncate(1);
        }
        data
    }
}

/// A frame the simulated devices received, with the bus registrations that
/// were live when it was processed.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub frame: Frame,
    pub registered: Vec<u8>,
}

struct MockState {
    servos: BTreeMap<u8, MockServo>,
    transmitted: Vec<Frame>,
    received: Vec<ReceivedFrame>,
    reply_delay: Duration,
    echo: bool,
    drop_id_writes: bool,
}

impl MockState {
    fn answer(&mut self, frame: &Frame) -> Option<Vec<u8>> {
        let servo = self.servos.get_mut(&frame.id)?;
        if servo.silent {
            return None;
        }

        let (reply_id, params) = match frame.command {
            Command::Write if frame.address == register::ID => {
                if self.drop_id_writes {
                    return None;
                }
                let new_id = *frame.params.first()?;
                if servo.locked() {
                    (frame.id, Vec::new())
                } else {
                    let mut moved = self.servos.remove(&frame.id)?;
                    moved.id = new_id;
                    moved.set_registers(register::ID, &[new_id]);
                    self.servos.insert(new_id, moved);
                    (new_id, Vec::new())
                }
            }
            Command::Write if !frame.params.is_empty() => {
                servo.write(frame.address, &frame.params);
                (frame.id, Vec::new())
            }
            Command::Read => {
                let len = usize::from(*frame.params.first()?);
                (frame.id, servo.read(frame.address, len))
            }
            _ => return None,
        };

        let mut buf = BytesMut::new();
        encode_response(reply_id, Command::Response, &params, &mut buf).ok()?;
        Some(buf.to_vec())
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transmit side handed to the [`Bus`]: records frames and forwards them to
/// the device task.
struct MockLink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    state: Arc<Mutex<MockState>>,
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(frame) = decode_frame(buf) {
            lock(&self.state).transmitted.push(frame);
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| std::io::Error::from(ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A [`Bus`] wired to simulated servos.
pub struct MockBus {
    pub bus: Arc<Bus>,
    state: Arc<Mutex<MockState>>,
    device: JoinHandle<()>,
}

impl MockBus {
    /// Start an empty bus with default settings. Must run inside a tokio runtime.
    pub fn start() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Start an empty bus with explicit settings.
    pub fn with_config(config: BusConfig) -> Self {
        let state = Arc::new(Mutex::new(MockState {
            servos: BTreeMap::new(),
            transmitted: Vec::new(),
            received: Vec::new(),
            reply_delay: Duration::ZERO,
            echo: true,
            drop_id_writes: false,
        }));
        let (tx, rx) = mpsc::unbounded_channel();
        let link = MockLink {
            tx,
            state: Arc::clone(&state),
        };
        let bus = Arc::new(Bus::with_config(link, config));
        let device = tokio::spawn(run_devices(Arc::downgrade(&bus), Arc::clone(&state), rx));
        Self { bus, state, device }
    }

    /// Attach a servo answering on `id`, EEPROM locked, at position 0.
    pub fn add_servo(&self, id: u8) {
        lock(&self.state).servos.insert(id, MockServo::new(id));
    }

    /// Snapshot of the servo currently answering on `id`.
    pub fn servo(&self, id: u8) -> Option<MockServo> {
        lock(&self.state).servos.get(&id).cloned()
    }

    /// Modify the servo answering on `id`.
    pub fn servo_mut(&self, id: u8, f: impl FnOnce(&mut MockServo)) {
        if let Some(servo) = lock(&self.state).servos.get_mut(&id) {
            f(servo);
        }
    }

    /// Set the present position register.
    pub fn set_position(&self, id: u8, raw: u16) {
        self.servo_mut(id, |s| s.set_registers(register::PRESENT_POSITION, &raw.to_be_bytes()));
    }

    /// Stop (or resume) answering on `id`.
    pub fn set_silent(&self, id: u8, silent: bool) {
        self.servo_mut(id, |s| s.silent = silent);
    }

    /// Truncate read replies from `id` to one byte.
    pub fn set_short_reads(&self, id: u8, short: bool) {
        self.servo_mut(id, |s| s.short_reads = short);
    }

    /// Delay every reply by `delay` after the echo.
    pub fn set_reply_delay(&self, delay: Duration) {
        lock(&self.state).reply_delay = delay;
    }

    /// Turn the half-duplex echo on or off.
    pub fn set_echo(&self, echo: bool) {
        lock(&self.state).echo = echo;
    }

    /// Swallow ID writes without changing or answering.
    pub fn drop_id_writes(&self, drop: bool) {
        lock(&self.state).drop_id_writes = drop;
    }

    /// Every frame written to the bus so far, in order.
    pub fn transmitted(&self) -> Vec<Frame> {
        lock(&self.state).transmitted.clone()
    }

    /// Every frame the devices processed so far, in order.
    pub fn received(&self) -> Vec<ReceivedFrame> {
        lock(&self.state).received.clone()
    }
}

impl Drop for MockBus {
    fn drop(&mut self) {
        self.device.abort();
    }
}

async fn run_devices(
    bus: Weak<Bus>,
    state: Arc<Mutex<MockState>>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(bytes) = rx.recv().await {
        let Some(bus) = bus.upgrade() else {
            break;
        };
        let frame = match decode_frame(&bytes) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(error = %err, "mock device ignoring undecodable write");
                continue;
            }
        };

        let registered = bus.registered_ids();
        let (echo, delay, reply) = {
            let mut state = lock(&state);
            state.received.push(ReceivedFrame {
                frame: frame.clone(),
                registered,
            });
            (state.echo, state.reply_delay, state.answer(&frame))
        };

        if echo {
            bus.feed(&bytes);
        }
        if let Some(reply) = reply {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            bus.feed(&reply);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn answers_reads_from_register_file() {
        let mock = MockBus::start();
        mock.add_servo(3);
        mock.set_position(3, 0x0123);

        let reply = lock(&mock.state)
            .answer(&Frame::new(3, Command::Read, register::PRESENT_POSITION, vec![2u8]))
            .unwrap();
        assert_eq!(&reply[..5], &[0xFF, 0xFF, 3, 4, 0x00]);
        assert_eq!(&reply[5..7], &[0x01, 0x23]);
    }

    #[tokio::test(start_paused = true)]
    async fn eeprom_writes_need_unlock() {
        let mock = MockBus::start();
        mock.add_servo(1);

        let offset = Frame::new(1, Command::Write, register::OFFSET, vec![0x00, 0x10]);
        lock(&mock.state).answer(&offset).unwrap();
        assert_eq!(mock.servo(1).unwrap().offset_bytes(), [0x00, 0x00]);

        let unlock = Frame::new(1, Command::Write, register::LOCK, vec![0u8]);
        lock(&mock.state).answer(&unlock).unwrap();
        lock(&mock.state).answer(&offset).unwrap();
        assert_eq!(mock.servo(1).unwrap().offset_bytes(), [0x00, 0x10]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_ids_stay_quiet() {
        let mock = MockBus::start();
        let frame = Frame::new(8, Command::Write, register::TORQUE_ENABLE, vec![1u8]);
        assert!(lock(&mock.state).answer(&frame).is_none());
    }
}

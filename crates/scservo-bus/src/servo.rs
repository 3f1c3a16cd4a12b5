use std::sync::Arc;

use bytes::Bytes;
use scservo_frame::{register, Command, Frame};
use tracing::{debug, info, warn};

use crate::bus::{check_id, Bus, InboundSink};
use crate::convert::{
    check_offset, decode_offset, decode_position, degrees_to_raw, encode_offset, raw_to_degrees,
};
use crate::error::{BusError, Result};
use crate::pending::{Inbox, PendingResponse};

/// Bytes requested when reading the present position.
const POSITION_LEN: u8 = 2;

/// Bytes requested when reading the calibration offset.
const OFFSET_LEN: u8 = 2;

/// One servo on a shared [`Bus`].
///
/// Construction registers the id with the bus; dropping the servo releases
/// it. Every operation sends one command and suspends until the servo answers
/// or the bus response timeout expires. Responses are matched to requests in
/// the order the requests were sent.
pub struct Servo {
    bus: Arc<Bus>,
    id: u8,
    offset: i16,
    inbox: Arc<Inbox>,
}

impl Servo {
    /// Attach to the servo answering on `id`.
    pub fn new(bus: &Arc<Bus>, id: u8) -> Result<Self> {
        check_id(id)?;
        let inbox = Arc::new(Inbox::new());
        bus.register(id, inbox.clone())?;
        Ok(Self {
            bus: Arc::clone(bus),
            id,
            offset: 0,
            inbox,
        })
    }

    /// Current device id.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Calibration offset added to every angle command, in degrees.
    pub fn offset(&self) -> i16 {
        self.offset
    }

    /// Change the calibration offset locally. [`Servo::save_settings`]
    /// persists it on the device.
    pub fn set_offset(&mut self, offset: i16) -> Result<()> {
        check_offset(offset)?;
        self.offset = offset;
        Ok(())
    }

    /// The bus this servo talks on.
    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// Requests sent but not yet answered or expired.
    pub fn pending_requests(&self) -> usize {
        self.inbox.len()
    }

    /// Send one command and return a handle to its response.
    ///
    /// The request is queued and its deadline armed before the frame goes
    /// out. Must be called inside a tokio runtime.
    pub async fn send_command(
        &self,
        command: Command,
        address: u8,
        params: &[u8],
    ) -> Result<PendingResponse> {
        let bytes = Frame::new(self.id, command, address, Bytes::copy_from_slice(params)).to_bytes()?;
        let pending = self.inbox.enqueue(self.bus.config().response_timeout);
        if let Err(err) = self.bus.send(&bytes) {
            self.inbox.cancel(pending.seq);
            return Err(err);
        }
        debug!(
            id = self.id,
            command = command.name(),
            register = register::register_name(address),
            "command sent"
        );
        Ok(pending)
    }

    async fn request(&self, command: Command, address: u8, params: &[u8]) -> Result<Bytes> {
        self.send_command(command, address, params).await?.wait().await
    }

    async fn write_register(&self, address: u8, params: &[u8]) -> Result<()> {
        self.request(Command::Write, address, params).await.map(|_| ())
    }

    async fn read_register(&self, address: u8, len: u8) -> Result<Bytes> {
        let data = self.request(Command::Read, address, &[len]).await?;
        if data.len() < usize::from(len) {
            return Err(BusError::ShortResponse {
                expected: usize::from(len),
                actual: data.len(),
            });
        }
        Ok(data)
    }

    /// Enable or disable holding torque.
    pub async fn set_torque(&self, enabled: bool) -> Result<()> {
        self.write_register(register::TORQUE_ENABLE, &[u8::from(enabled)])
            .await
    }

    /// Move to `degrees` (0 to 200, offset applied) at the servo's own speed.
    pub async fn set_angle(&self, degrees: f64) -> Result<()> {
        let raw = self.goal_position(degrees);
        self.write_register(register::GOAL_POSITION, &raw.to_be_bytes())
            .await
    }

    /// Move to `degrees`, arriving after `goal_time_ms`.
    ///
    /// Position and time go out in one write spanning GOAL_POSITION and
    /// GOAL_TIME.
    pub async fn set_angle_in_time(&self, degrees: f64, goal_time_ms: u16) -> Result<()> {
        let [pos_hi, pos_lo] = self.goal_position(degrees).to_be_bytes();
        let [time_hi, time_lo] = goal_time_ms.to_be_bytes();
        self.write_register(register::GOAL_POSITION, &[pos_hi, pos_lo, time_hi, time_lo])
            .await
    }

    fn goal_position(&self, degrees: f64) -> u16 {
        degrees_to_raw(degrees + f64::from(self.offset))
    }

    /// Ask for the present position without waiting for it.
    ///
    /// Decode the payload with [`decode_position`](crate::decode_position).
    pub async fn request_read_status(&self) -> Result<PendingResponse> {
        self.send_command(Command::Read, register::PRESENT_POSITION, &[POSITION_LEN])
            .await
    }

    /// Present position in degrees, without the calibration offset.
    pub async fn read_status(&self) -> Result<f64> {
        let data = self.request_read_status().await?.wait().await?;
        Ok(raw_to_degrees(decode_position(&data)?))
    }

    /// Reassign the servo's id, persisting it on the device.
    ///
    /// The new id is registered in the same step that transmits the write, so
    /// the acknowledgment (which already carries the new id) is routed here.
    /// The old id stays registered until the device is locked again.
    ///
    /// Dropping the future before the ack arrives releases the new id but
    /// cannot relock the device; call [`Servo::save_settings`] or retry
    /// `flash_id` to relock it.
    pub async fn flash_id(&mut self, new_id: u8) -> Result<()> {
        check_id(new_id)?;
        if new_id == self.id {
            return Ok(());
        }
        if self.bus.is_registered(new_id) {
            return Err(BusError::IdAlreadyRegistered(new_id));
        }

        let old_id = self.id;
        info!(old_id, new_id, "reassigning servo id");
        self.write_register(register::LOCK, &[0]).await?;

        let sink: Arc<dyn InboundSink> = self.inbox.clone();
        let bytes = Frame::new(old_id, Command::Write, register::ID, vec![new_id]).to_bytes()?;
        let pending = self.inbox.enqueue(self.bus.config().response_timeout);
        if let Err(err) = self.bus.send_and_register(&bytes, new_id, Arc::clone(&sink)) {
            self.inbox.cancel(pending.seq);
            self.relock_after_failure().await;
            return Err(err);
        }

        // Cancelling the future while the ack is outstanding must not leave
        // `new_id` owned by this endpoint.
        let provisional = ProvisionalId {
            bus: Arc::clone(&self.bus),
            id: new_id,
            sink: Arc::clone(&sink),
            committed: false,
        };

        if let Err(err) = pending.wait().await {
            warn!(old_id, new_id, error = %err, "id change not acknowledged, keeping old id");
            drop(provisional);
            self.relock_after_failure().await;
            return Err(err);
        }

        provisional.commit();
        self.id = new_id;
        let relocked = self.write_register(register::LOCK, &[1]).await;
        self.bus.release(old_id, &sink);
        info!(old_id, new_id, "servo id reassigned");
        relocked
    }

    async fn relock_after_failure(&self) {
        if let Err(err) = self.write_register(register::LOCK, &[1]).await {
            warn!(id = self.id, error = %err, "could not relock after failed write");
        }
    }

    /// Calibration offset stored on the device.
    ///
    /// A stored value outside ±2000 fails with [`BusError::OffsetOutOfRange`].
    pub async fn read_offset_angle(&self) -> Result<i16> {
        let data = self.read_register(register::OFFSET, OFFSET_LEN).await?;
        let offset = decode_offset([data[0], data[1]]);
        check_offset(offset)?;
        Ok(offset)
    }

    /// Store `offset` on the device and use it for later angle commands.
    ///
    /// Out-of-range values fail before anything is sent.
    pub async fn set_offset_angle(&mut self, offset: i16) -> Result<()> {
        self.write_offset(offset).await?;
        self.offset = offset;
        Ok(())
    }

    /// Adopt the offset stored on the device. Returns it.
    pub async fn load_settings(&mut self) -> Result<i16> {
        let offset = self.read_offset_angle().await?;
        debug!(id = self.id, offset, "loaded settings");
        self.offset = offset;
        Ok(offset)
    }

    /// Persist the local offset on the device.
    pub async fn save_settings(&self) -> Result<()> {
        self.write_offset(self.offset).await
    }

    async fn write_offset(&self, offset: i16) -> Result<()> {
        let encoded = encode_offset(offset)?;
        self.write_register(register::LOCK, &[0]).await?;
        let written = self.write_register(register::OFFSET, &encoded).await;
        let relocked = self.write_register(register::LOCK, &[1]).await;
        written?;
        relocked
    }
}

/// Registration taken for an id change that has not been acknowledged yet.
/// Released on drop unless committed.
struct ProvisionalId {
    bus: Arc<Bus>,
    id: u8,
    sink: Arc<dyn InboundSink>,
    committed: bool,
}

impl ProvisionalId {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ProvisionalId {
    fn drop(&mut self) {
        if !self.committed {
            self.bus.release(self.id, &self.sink);
        }
    }
}

impl Drop for Servo {
    fn drop(&mut self) {
        let sink: Arc<dyn InboundSink> = self.inbox.clone();
        self.bus.release(self.id, &sink);
    }
}

impl std::fmt::Debug for Servo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Servo")
            .field("id", &self.id)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

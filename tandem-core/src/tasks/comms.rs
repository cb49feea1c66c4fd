//! Command reception from the host link
//!
//! Bytes from the serial link are reassembled into frames; each valid
//! frame refreshes link liveness. Commands go to the command queue with a
//! non-blocking send and are acknowledged with the outcome. A full queue
//! drops the new command; it is counted and reported to the host, never
//! waited on.

use embedded_io_async::Read;
use tandem_hal::Timer;
use tandem_protocol::{AckStatus, DeviceMessage, FrameParser, HostMessage};

use crate::kernel::Kernel;
use crate::motor::{MotorCommand, MotorId};

pub struct CommandRxTask<'k, T: Timer> {
    kernel: &'k Kernel,
    timer: T,
    parser: FrameParser,
    frames: u32,
}

impl<'k, T: Timer> CommandRxTask<'k, T> {
    pub fn new(kernel: &'k Kernel, timer: T) -> Self {
        Self {
            kernel,
            timer,
            parser: FrameParser::new(),
            frames: 0,
        }
    }

    /// Valid frames received so far
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Malformed frames seen so far
    pub fn frame_errors(&self) -> u32 {
        self.parser.errors()
    }

    /// Feed received bytes, calling `reply` for every message to send back
    pub fn on_bytes(&mut self, mut bytes: &[u8], mut reply: impl FnMut(DeviceMessage)) {
        while !bytes.is_empty() {
            let (used, result) = self.parser.feed_bytes(bytes);
            bytes = &bytes[used..];
            match result {
                Ok(Some(frame)) => match HostMessage::from_frame(&frame) {
                    Ok(msg) => {
                        self.frames = self.frames.wrapping_add(1);
                        self.kernel.link.touch(self.timer.now_micros());
                        if let Some(ack) = self.handle(msg) {
                            reply(ack);
                        }
                    }
                    Err(e) => warn!("unusable frame type {}: {:?}", frame.msg_type, e),
                },
                Ok(None) => {}
                Err(e) => debug!("frame error: {:?}", e),
            }
        }
    }

    fn handle(&mut self, msg: HostMessage) -> Option<DeviceMessage> {
        let k = self.kernel;
        match msg {
            HostMessage::Command {
                seq,
                motor,
                kind,
                value,
            } => {
                let status = match MotorId::new(motor) {
                    None => AckStatus::BadMotor,
                    Some(_) if k.estop.is_latched() => AckStatus::Latched,
                    Some(motor_id) => {
                        let cmd = MotorCommand::new(motor_id, kind.into(), value, self.timer.now_micros());
                        match k.submit(cmd) {
                            Ok(()) => AckStatus::Accepted,
                            Err(_) => AckStatus::QueueFull,
                        }
                    }
                };
                Some(DeviceMessage::Ack { seq, status })
            }
            HostMessage::Heartbeat => None,
            HostMessage::ResetRequest { key } => {
                info!("reset requested by host");
                k.reset_request.signal(key);
                None
            }
        }
    }

    /// Read from the link forever, writing replies through `send`
    pub async fn run<R: Read>(&mut self, rx: &mut R, mut send: impl FnMut(DeviceMessage)) -> ! {
        let mut buf = [0u8; 32];
        loop {
            match rx.read(&mut buf).await {
                Ok(n) => self.on_bytes(&buf[..n], &mut send),
                Err(_) => {
                    warn!("link read error");
                    self.parser.reset();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::ipc::NoBoost;
    use tandem_protocol::CommandKind;
    use tandem_hal_sim::SimClock;

    static NO_BOOST: NoBoost = NoBoost;

    fn encode(msg: HostMessage) -> std::vec::Vec<u8> {
        msg.to_frame().unwrap().encode_to_vec().unwrap().to_vec()
    }

    fn command(seq: u8, motor: u8) -> std::vec::Vec<u8> {
        encode(HostMessage::Command {
            seq,
            motor,
            kind: CommandKind::MoveToPosition,
            value: 45_000,
        })
    }

    #[test]
    fn test_command_is_queued_and_acked() {
        let kernel = Kernel::new(SystemConfig::default(), &NO_BOOST).unwrap();
        let mut rx = CommandRxTask::new(&kernel, SimClock::starting_at(1_000));
        let mut acks = std::vec::Vec::new();

        rx.on_bytes(&command(7, 1), |m| acks.push(m));
        assert_eq!(
            acks,
            vec![DeviceMessage::Ack {
                seq: 7,
                status: AckStatus::Accepted
            }]
        );
        let cmd = kernel.commands.try_receive().unwrap();
        assert_eq!(cmd.motor_id, MotorId::M1);
        assert_eq!(cmd.target_value, 45_000);
        assert_eq!(cmd.timestamp_us, 1_000);
        assert_eq!(kernel.link.silent_for(1_500), Some(500));
    }

    #[test]
    fn test_bad_motor_and_full_queue() {
        let kernel = Kernel::new(SystemConfig::default(), &NO_BOOST).unwrap();
        let mut rx = CommandRxTask::new(&kernel, SimClock::new());
        let mut acks = std::vec::Vec::new();

        rx.on_bytes(&command(1, 5), |m| acks.push(m));
        let mut stream = std::vec::Vec::new();
        for seq in 0..9 {
            stream.extend(command(seq, 0));
        }
        rx.on_bytes(&stream, |m| acks.push(m));

        assert_eq!(acks.len(), 10);
        assert_eq!(
            acks[0],
            DeviceMessage::Ack {
                seq: 1,
                status: AckStatus::BadMotor
            }
        );
        assert_eq!(
            acks[9],
            DeviceMessage::Ack {
                seq: 8,
                status: AckStatus::QueueFull
            }
        );
        assert_eq!(kernel.counters().command_drops, 1);
    }

    #[test]
    fn test_reset_request_signalled() {
        let kernel = Kernel::new(SystemConfig::default(), &NO_BOOST).unwrap();
        let mut rx = CommandRxTask::new(&kernel, SimClock::new());
        let mut garbage = vec![0x00, 0x13];
        garbage.extend(encode(HostMessage::ResetRequest { key: 0xDEAD_BEEF }));
        rx.on_bytes(&garbage, |_| panic!("no reply expected"));
        assert_eq!(kernel.reset_request.try_take(), Some(0xDEAD_BEEF));
        assert_eq!(rx.frames(), 1);
    }
}
